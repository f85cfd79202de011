use maud::{html, Markup};

use crate::{forms::FieldErrors, models::LoanStatus, pagination::Paginator};

fn feedback(errors: &[String]) -> Markup {
    html! {
        @for error in errors {
            .invalid-feedback { (error) }
        }
    }
}

pub fn text_input(
    id: &'static str,
    label: &str,
    value: &str,
    errors: &FieldErrors,
    required: bool,
) -> Markup {
    let errors = errors.get(id);

    html! {
        .form-floating."mb-2" {
            input .form-control.is-invalid[!errors.is_empty()] required[required] #(id) name=(id)
                type="text" placeholder=(label) value=(value);
            label for=(id) { (label) }
            (feedback(errors))
        }
    }
}

pub fn textarea_input(id: &'static str, label: &str, value: &str, errors: &FieldErrors) -> Markup {
    let errors = errors.get(id);

    html! {
        .form-floating."mb-2" {
            textarea .form-control.is-invalid[!errors.is_empty()] required #(id) name=(id)
                placeholder=(label) style="height: 150px" {
                (value)
            }
            label for=(id) { (label) }
            (feedback(errors))
        }
    }
}

pub fn date_input(
    id: &'static str,
    label: &str,
    value: &str,
    errors: &FieldErrors,
    help: Option<&str>,
) -> Markup {
    let errors = errors.get(id);

    html! {
        .form-floating."mb-2" {
            input .form-control.is-invalid[!errors.is_empty()] #(id) name=(id)
                type="date" placeholder="1970-01-01" value=(value);
            label for=(id) { (label) }
            (feedback(errors))
            @if let Some(help) = help {
                .form-text { (help) }
            }
        }
    }
}

/// `options` are `(value, label)` pairs
pub fn select_input(
    id: &'static str,
    label: &str,
    options: &[(String, String)],
    selected: &[String],
    multiple: bool,
    errors: &FieldErrors,
) -> Markup {
    let errors = errors.get(id);

    html! {
        ."mb-2" {
            label .form-label for=(id) { (label) }
            select .form-select.is-invalid[!errors.is_empty()] #(id) name=(id) multiple[multiple] {
                @if !multiple {
                    option value="" selected[selected.iter().all(String::is_empty)] { "---------" }
                }
                @for (value, text) in options {
                    option value=(value) selected[selected.contains(value)] { (text) }
                }
            }
            (feedback(errors))
        }
    }
}

pub fn form_page(title: &str, submit: &str, fields: Markup) -> Markup {
    html! {
        form .container-sm.align-items-center method="POST" {
            .container.text-center {
                h1 { (title) }
            }
            (fields)
            .container.text-center {
                input type="submit" .btn.btn-primary value=(submit);
            }
        }
    }
}

/// Confirmation page of a delete screen, `consequences` lists what else the deletion touches
pub fn confirm_delete(what: &str, name: &str, cancel: &str, consequences: Markup) -> Markup {
    html! {
        .container.text-center {
            h1 { (format!("Delete {what}")) }
            p { "Are you sure you want to delete " strong { (name) } "?" }
            (consequences)
            form method="POST" {
                a .btn.btn-secondary."me-2" href=(cancel) { "Cancel" }
                input type="submit" .btn.btn-danger value="Yes, delete";
            }
        }
    }
}

pub fn paginator(p: &Paginator, href: impl Fn(i64) -> String) -> Markup {
    html! {
        @if p.is_paginated() {
            nav aria-label="Pages" {
                ul .pagination.justify-content-center {
                    @if let Some(previous) = p.previous() {
                        li .page-item { a .page-link href=(href(previous)) { "previous" } }
                    }
                    li .page-item.active aria-current="page" {
                        span .page-link { (format!("Page {} of {}", p.number, p.num_pages())) }
                    }
                    @if let Some(next) = p.next() {
                        li .page-item { a .page-link href=(href(next)) { "next" } }
                    }
                }
            }
        }
    }
}

pub fn status_badge(status: LoanStatus) -> Markup {
    let class = match status {
        LoanStatus::Available => "text-bg-success",
        LoanStatus::Maintenance => "text-bg-danger",
        LoanStatus::OnLoan | LoanStatus::Reserved => "text-bg-warning",
    };

    html! {
        span .badge.(class) { (status.to_string()) }
    }
}

/// Librarian action buttons shown on detail pages
pub fn edit_links(base: &str) -> Markup {
    html! {
        a .ms-2.btn.btn-primary.btn-sm href=(format!("{base}/update")) { i .bi.bi-pencil {} }
        a .ms-2.btn.btn-danger.btn-sm href=(format!("{base}/delete")) { i .bi.bi-trash {} }
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;

    use crate::{forms::FieldErrors, models::LoanStatus, pagination::Paginator};

    #[test]
    fn single_page_has_no_navigation() {
        let p = Paginator::new(1, 10, 3).unwrap();
        assert_eq!(super::paginator(&p, |n| format!("?page={n}")).into_string(), "");
    }

    #[test]
    fn middle_page_navigation() {
        let p = Paginator::new(2, 10, 30).unwrap();
        let html = super::paginator(&p, |n| format!("/books?page={n}")).into_string();

        assert!(html.contains(r#"href="/books?page=1""#));
        assert!(html.contains(r#"href="/books?page=3""#));
        assert!(html.contains("Page 2 of 3"));
    }

    #[test]
    fn badge() {
        expect![[r#"<span class="badge text-bg-warning">On loan</span>"#]]
            .assert_eq(&super::status_badge(LoanStatus::OnLoan).into_string());
    }

    #[test]
    fn invalid_field() {
        let mut errors = FieldErrors::default();
        errors.add("name", "This field is required.");

        let html = super::text_input("name", "Name", "", &errors, true).into_string();
        assert!(html.contains("is-invalid"));
        assert!(html.contains(r#"<div class="invalid-feedback">This field is required.</div>"#));

        let html = super::text_input("name", "Name", "Poetry", &FieldErrors::default(), true)
            .into_string();
        assert!(!html.contains("is-invalid"));
        assert!(html.contains(r#"value="Poetry""#));
    }

    #[test]
    fn select_marks_choices() {
        let options = [
            ("1".to_owned(), "Fantasy".to_owned()),
            ("2".to_owned(), "Poetry".to_owned()),
        ];
        let html = super::select_input(
            "genre",
            "Genre",
            &options,
            &["2".to_owned()],
            true,
            &FieldErrors::default(),
        )
        .into_string();

        assert!(html.contains(r#"<option value="2" selected>Poetry</option>"#));
        assert!(html.contains(r#"<option value="1">Fantasy</option>"#));
        assert!(!html.contains("---------"));
    }
}
