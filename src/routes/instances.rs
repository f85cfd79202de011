use std::collections::HashMap;

use axum::{
    extract::Query,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::{Datelike, Days, NaiveDate};
use diesel::{pg::Pg, prelude::*};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use maud::{html, Markup};
use uuid::Uuid;

use crate::{
    forms::{BookInstanceForm, FieldErrors, RenewBookForm, INVALID_CHOICE},
    models::{BookInstance, BookInstanceEdit, LoanStatus, NewBookInstance},
    pagination::{requested_page, Paginator},
    routes::components::{self, edit_links, status_badge},
    schema::{book, bookinstance},
    State,
};

use super::{
    app_page, or_not_found, raw_app_page, today, Id, Librarian, Page, RouteError, Visitor,
};

/// Buckets of due dates offered when filtering the list of copies
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DueFilter {
    #[default]
    Any,
    Today,
    Past7,
    Month,
    Year,
    NoDate,
    HasDate,
}

impl DueFilter {
    fn all() -> &'static [Self] {
        &[
            Self::Any,
            Self::Today,
            Self::Past7,
            Self::Month,
            Self::Year,
            Self::NoDate,
            Self::HasDate,
        ]
    }

    fn query_value(&self) -> &'static str {
        match self {
            DueFilter::Any => "any",
            DueFilter::Today => "today",
            DueFilter::Past7 => "past7",
            DueFilter::Month => "month",
            DueFilter::Year => "year",
            DueFilter::NoDate => "none",
            DueFilter::HasDate => "some",
        }
    }

    /// Unknown values select every date
    fn from_query(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::all().iter().copied().find(|f| f.query_value() == v))
            .unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        match self {
            DueFilter::Any => "Any date",
            DueFilter::Today => "Today",
            DueFilter::Past7 => "Past 7 days",
            DueFilter::Month => "This month",
            DueFilter::Year => "This year",
            DueFilter::NoDate => "No date",
            DueFilter::HasDate => "Has date",
        }
    }

    /// Inclusive date range covered by the filter, for the filters that are ranges
    fn bounds(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            DueFilter::Today => Some((today, today)),
            DueFilter::Past7 => Some((today.checked_sub_days(Days::new(7))?, today)),
            DueFilter::Month => {
                let first = today.with_day(1)?;
                let next = first.checked_add_months(chrono::Months::new(1))?;
                Some((first, next.pred_opt()?))
            }
            DueFilter::Year => Some((
                NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
                NaiveDate::from_ymd_opt(today.year(), 12, 31)?,
            )),
            DueFilter::Any | DueFilter::NoDate | DueFilter::HasDate => None,
        }
    }
}

#[derive(serde::Deserialize, Default, Debug)]
pub(crate) struct InstanceQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    due: Option<String>,
    #[serde(default)]
    page: Option<String>,
}

fn instances_href(status: Option<LoanStatus>, due: DueFilter, page: Option<i64>) -> String {
    let mut params = Vec::new();
    if let Some(status) = status {
        params.push(format!("status={}", status.code()));
    }
    if due != DueFilter::Any {
        params.push(format!("due={}", due.query_value()));
    }
    if let Some(page) = page {
        params.push(format!("page={page}"));
    }

    match params.is_empty() {
        true => "/bookinstances".to_owned(),
        false => format!("/bookinstances?{}", params.join("&")),
    }
}

fn filtered(
    status: Option<LoanStatus>,
    due: DueFilter,
    today: NaiveDate,
) -> bookinstance::BoxedQuery<'static, Pg> {
    let mut query = bookinstance::table.into_boxed();

    if let Some(status) = status {
        query = query.filter(bookinstance::status.eq(status));
    }

    match due {
        DueFilter::NoDate => query = query.filter(bookinstance::due_back.is_null()),
        DueFilter::HasDate => query = query.filter(bookinstance::due_back.is_not_null()),
        _ => {
            if let Some((from, to)) = due.bounds(today) {
                query = query.filter(bookinstance::due_back.between(from, to));
            }
        }
    }

    query
}

/// Titles of the books the copies belong to
async fn titles_of(
    conn: &mut AsyncPgConnection,
    copies: &[BookInstance],
) -> Result<HashMap<i32, String>, RouteError> {
    let ids: Vec<i32> = copies.iter().filter_map(|c| c.book).collect();

    Ok(book::table
        .filter(book::id.eq_any(&ids))
        .select((book::id, book::title))
        .load::<(i32, String)>(conn)
        .await?
        .into_iter()
        .collect())
}

async fn find_instance(
    conn: &mut AsyncPgConnection,
    id: Uuid,
) -> Result<(BookInstance, Option<String>), RouteError> {
    bookinstance::table
        .find(id)
        .left_join(book::table)
        .select((BookInstance::as_select(), book::title.nullable()))
        .get_result(conn)
        .await
        .map_err(or_not_found)
}

pub(crate) async fn list_instances(
    state: State,
    Librarian(user): Librarian,
    Query(query): Query<InstanceQuery>,
) -> Result<Markup, RouteError> {
    let number = requested_page(query.page.as_deref()).ok_or(RouteError::NotFound)?;
    let mut conn = state.db.get().await?;

    let status = query.status.as_deref().and_then(LoanStatus::from_code);
    let due = DueFilter::from_query(query.due.as_deref());
    let today = today();

    let total: i64 = filtered(status, due, today)
        .count()
        .get_result(&mut conn)
        .await?;
    let pages = Paginator::new(number, state.config.catalog.page_size, total)
        .ok_or(RouteError::NotFound)?;

    let copies: Vec<BookInstance> = filtered(status, due, today)
        .order((
            bookinstance::due_back.asc(),
            bookinstance::id.asc(),
        ))
        .limit(pages.per_page)
        .offset(pages.offset())
        .select(BookInstance::as_select())
        .load(&mut conn)
        .await?;

    let titles = titles_of(&mut conn, &copies).await?;

    Ok(app_page(
        Page::Copies,
        Some(&user),
        html! {
            .container {
                h1 {
                    "Copies"
                    a .ms-2.btn.btn-primary.btn-sm href="/bookinstance/create" { i .bi.bi-plus-lg {} }
                }
                .row {
                    ."col-md-9" {
                        @if copies.is_empty() {
                            p { "No copy matches the selected filters." }
                        } @else {
                            table .table {
                                thead {
                                    tr {
                                        th scope="col" { "Book" }
                                        th scope="col" { "Status" }
                                        th scope="col" { "Due back" }
                                    }
                                }
                                tbody {
                                    @for copy in &copies {
                                        @let title = copy.book.and_then(|b| titles.get(&b)).map(String::as_str);
                                        tr {
                                            td {
                                                a href=(format!("/bookinstance/{}", copy.id)) {
                                                    (copy.label(title))
                                                }
                                            }
                                            td { (status_badge(copy.status)) }
                                            td { (copy.due_back.map(|d| d.to_string()).unwrap_or_else(|| "-".into())) }
                                        }
                                    }
                                }
                            }
                        }
                        (components::paginator(&pages, |n| instances_href(status, due, Some(n))))
                    }
                    ."col-md-3" {
                        h5 { "By status" }
                        ul .nav.flex-column."mb-3" {
                            li .nav-item {
                                a .nav-link.active[status.is_none()] href=(instances_href(None, due, None)) { "All" }
                            }
                            @for &s in LoanStatus::all() {
                                li .nav-item {
                                    a .nav-link.active[status == Some(s)] href=(instances_href(Some(s), due, None)) {
                                        (s.to_string())
                                    }
                                }
                            }
                        }
                        h5 { "By due back" }
                        ul .nav.flex-column {
                            @for &d in DueFilter::all() {
                                li .nav-item {
                                    a .nav-link.active[due == d] href=(instances_href(status, d, None)) {
                                        (d.name())
                                    }
                                }
                            }
                        }
                    }
                }
            }
        },
    ))
}

pub(crate) async fn borrowed(
    state: State,
    Librarian(user): Librarian,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let copies: Vec<(BookInstance, Option<String>)> = bookinstance::table
        .left_join(book::table)
        .filter(bookinstance::status.eq(LoanStatus::OnLoan))
        .order((bookinstance::due_back.asc(), bookinstance::id.asc()))
        .select((BookInstance::as_select(), book::title.nullable()))
        .load(&mut conn)
        .await?;

    let today = today();

    Ok(app_page(
        Page::Borrowed,
        Some(&user),
        html! {
            .container {
                h1 { "All Borrowed Books" }
                @if copies.is_empty() {
                    p { "There are no books borrowed." }
                }
                ul {
                    @for (copy, title) in &copies {
                        li .text-danger[copy.is_overdue(today)] {
                            @match (copy.book, title) {
                                (Some(book), Some(title)) => {
                                    a href=(format!("/book/{book}")) { (title) }
                                }
                                _ => { (copy.label(None)) }
                            }
                            " ("
                            (copy.due_back.map(|d| d.to_string()).unwrap_or_else(|| "no due date".into()))
                            ") "
                            a href=(format!("/bookinstance/{}/renew", copy.id)) { "Renew" }
                        }
                    }
                }
            }
        },
    ))
}

pub(crate) async fn get_instance(
    state: State,
    Visitor(user): Visitor,
    id: Id<Uuid>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let (copy, title) = find_instance(&mut conn, *id).await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(raw_app_page(
        None,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Copy: " (copy.label(title.as_deref()))
                    @if librarian {
                        (edit_links(&format!("/bookinstance/{}", copy.id)))
                    }
                }
                p {
                    strong { "Book: " }
                    @match (copy.book, &title) {
                        (Some(book), Some(title)) => {
                            a href=(format!("/book/{book}")) { (title) }
                        }
                        _ => { "None" }
                    }
                }
                p { strong { "Imprint: " } (copy.imprint) }
                p { strong { "Status: " } (status_badge(copy.status)) }
                @if let Some(due) = copy.due_back {
                    p { strong { "Due back: " } (due.to_string()) }
                }
                @if librarian {
                    a .btn.btn-secondary href=(format!("/bookinstance/{}/renew", copy.id)) { "Renew" }
                }
            }
        },
    ))
}

async fn instance_form(
    conn: &mut AsyncPgConnection,
    title: &str,
    form: &BookInstanceForm,
    errors: &FieldErrors,
) -> Result<Markup, RouteError> {
    let books: Vec<(String, String)> = book::table
        .order((book::title.asc(), book::id.asc()))
        .select((book::id, book::title))
        .load::<(i32, String)>(conn)
        .await?
        .into_iter()
        .map(|(id, title)| (id.to_string(), title))
        .collect();

    let statuses: Vec<(String, String)> = LoanStatus::all()
        .iter()
        .map(|s| (s.code().to_owned(), s.to_string()))
        .collect();

    Ok(components::form_page(
        title,
        "Submit",
        html! {
            (components::select_input("book", "Book", &books, std::slice::from_ref(&form.book), false, errors))
            (components::text_input("imprint", "Imprint", &form.imprint, errors, true))
            h5 ."mt-3" { "Availability" }
            (components::select_input("status", "Status", &statuses, std::slice::from_ref(&form.status), false, errors))
            (components::date_input("due_back", "Due back", &form.due_back, errors, None))
        },
    ))
}

/// Validates the form, checking that the copied book exists
async fn check_instance(
    conn: &mut AsyncPgConnection,
    form: &BookInstanceForm,
) -> Result<Result<BookInstanceEdit, FieldErrors>, RouteError> {
    let edit = match form.validate() {
        Ok(edit) => edit,
        Err(errors) => return Ok(Err(errors)),
    };

    if let Some(book_id) = edit.book {
        let found: i64 = book::table
            .filter(book::id.eq(book_id))
            .count()
            .get_result(conn)
            .await?;
        if found == 0 {
            let mut errors = FieldErrors::default();
            errors.add("book", INVALID_CHOICE);
            return Ok(Err(errors));
        }
    }

    Ok(Ok(edit))
}

#[derive(serde::Deserialize, Debug)]
pub(crate) struct ForBook {
    book: Option<i32>,
}

pub(crate) async fn create_instance(
    state: State,
    Librarian(user): Librarian,
    Query(query): Query<ForBook>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    Ok(app_page(
        Page::Copies,
        Some(&user),
        instance_form(
            &mut conn,
            "Create copy",
            &BookInstanceForm::for_book(query.book),
            &FieldErrors::default(),
        )
        .await?,
    ))
}

pub(crate) async fn do_create_instance(
    state: State,
    Librarian(user): Librarian,
    Form(form): Form<BookInstanceForm>,
) -> Result<Response, RouteError> {
    let mut conn = state.db.get().await?;

    let fields = match check_instance(&mut conn, &form).await? {
        Ok(fields) => fields,
        Err(errors) => {
            return Ok(app_page(
                Page::Copies,
                Some(&user),
                instance_form(&mut conn, "Create copy", &form, &errors).await?,
            )
            .into_response())
        }
    };

    let id = Uuid::new_v4();

    diesel::insert_into(bookinstance::table)
        .values(&NewBookInstance { id, fields })
        .execute(&mut conn)
        .await?;

    tracing::info!("{} created copy {id}", user.name);

    Ok(Redirect::to(&format!("/bookinstance/{id}")).into_response())
}

pub(crate) async fn update_instance(
    state: State,
    Librarian(user): Librarian,
    id: Id<Uuid>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let (copy, _) = find_instance(&mut conn, *id).await?;

    Ok(app_page(
        Page::Copies,
        Some(&user),
        instance_form(
            &mut conn,
            "Update copy",
            &BookInstanceForm::from(&copy),
            &FieldErrors::default(),
        )
        .await?,
    ))
}

pub(crate) async fn do_update_instance(
    state: State,
    Librarian(user): Librarian,
    id: Id<Uuid>,
    Form(form): Form<BookInstanceForm>,
) -> Result<Response, RouteError> {
    let mut conn = state.db.get().await?;

    let changes = match check_instance(&mut conn, &form).await? {
        Ok(changes) => changes,
        Err(errors) => {
            return Ok(app_page(
                Page::Copies,
                Some(&user),
                instance_form(&mut conn, "Update copy", &form, &errors).await?,
            )
            .into_response())
        }
    };

    let updated = diesel::update(bookinstance::table.find(*id))
        .set(&changes)
        .execute(&mut conn)
        .await?;
    if updated == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} updated copy {}", user.name, *id);

    Ok(Redirect::to(&format!("/bookinstance/{}", *id)).into_response())
}

pub(crate) async fn delete_instance(
    state: State,
    Librarian(user): Librarian,
    id: Id<Uuid>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let (copy, title) = find_instance(&mut conn, *id).await?;

    Ok(app_page(
        Page::Copies,
        Some(&user),
        components::confirm_delete(
            "copy",
            &copy.label(title.as_deref()),
            &format!("/bookinstance/{}", copy.id),
            html! {},
        ),
    ))
}

pub(crate) async fn do_delete_instance(
    state: State,
    Librarian(user): Librarian,
    id: Id<Uuid>,
) -> Result<Redirect, RouteError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel::delete(bookinstance::table.find(*id))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} deleted copy {}", user.name, *id);

    Ok(Redirect::to("/bookinstances"))
}

fn renew_form(
    copy: &BookInstance,
    title: Option<&str>,
    form: &RenewBookForm,
    errors: &FieldErrors,
) -> Markup {
    components::form_page(
        &format!("Renew: {}", title.unwrap_or("no book")),
        "Renew",
        html! {
            p {
                strong { "Borrower due date: " }
                (copy.due_back.map(|d| d.to_string()).unwrap_or_else(|| "none".into()))
            }
            (components::date_input(
                "renewal_date",
                "Renewal date",
                &form.renewal_date,
                errors,
                Some("Enter a date between now and 4 weeks (default 3)."),
            ))
        },
    )
}

pub(crate) async fn renew_instance(
    state: State,
    Librarian(user): Librarian,
    id: Id<Uuid>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let (copy, title) = find_instance(&mut conn, *id).await?;

    Ok(app_page(
        Page::Borrowed,
        Some(&user),
        renew_form(
            &copy,
            title.as_deref(),
            &RenewBookForm::initial(today()),
            &FieldErrors::default(),
        ),
    ))
}

pub(crate) async fn do_renew_instance(
    state: State,
    Librarian(user): Librarian,
    id: Id<Uuid>,
    Form(form): Form<RenewBookForm>,
) -> Result<Response, RouteError> {
    let mut conn = state.db.get().await?;
    let (copy, title) = find_instance(&mut conn, *id).await?;

    let due_back = match form.validate(today()) {
        Ok(date) => date,
        Err(errors) => {
            return Ok(app_page(
                Page::Borrowed,
                Some(&user),
                renew_form(&copy, title.as_deref(), &form, &errors),
            )
            .into_response())
        }
    };

    diesel::update(bookinstance::table.find(copy.id))
        .set(bookinstance::due_back.eq(due_back))
        .execute(&mut conn)
        .await?;

    tracing::info!("{} renewed copy {} until {due_back}", user.name, copy.id);

    Ok(Redirect::to("/borrowed").into_response())
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use expect_test::expect;

    use super::{instances_href, DueFilter};
    use crate::models::LoanStatus;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn due_bounds() {
        let today = day(2024, 2, 14);

        assert_eq!(DueFilter::Today.bounds(today), Some((today, today)));
        assert_eq!(
            DueFilter::Past7.bounds(today),
            Some((day(2024, 2, 7), today))
        );
        assert_eq!(
            DueFilter::Month.bounds(today),
            Some((day(2024, 2, 1), day(2024, 2, 29)))
        );
        assert_eq!(
            DueFilter::Year.bounds(today),
            Some((day(2024, 1, 1), day(2024, 12, 31)))
        );
        assert_eq!(DueFilter::Any.bounds(today), None);
        assert_eq!(DueFilter::NoDate.bounds(today), None);
    }

    #[test]
    fn month_of_december() {
        assert_eq!(
            DueFilter::Month.bounds(day(2023, 12, 31)),
            Some((day(2023, 12, 1), day(2023, 12, 31)))
        );
    }

    #[test]
    fn filter_links() {
        expect!["/bookinstances"].assert_eq(&instances_href(None, DueFilter::Any, None));
        expect!["/bookinstances?status=o&due=past7&page=2"].assert_eq(&instances_href(
            Some(LoanStatus::OnLoan),
            DueFilter::Past7,
            Some(2),
        ));
        expect!["/bookinstances?due=none"].assert_eq(&instances_href(
            None,
            DueFilter::NoDate,
            None,
        ));
    }

    #[test]
    fn due_query_values() {
        for filter in DueFilter::all() {
            assert_eq!(DueFilter::from_query(Some(filter.query_value())), *filter);
        }

        assert_eq!(DueFilter::from_query(None), DueFilter::Any);
        assert_eq!(DueFilter::from_query(Some("")), DueFilter::Any);
        assert_eq!(DueFilter::from_query(Some("bogus")), DueFilter::Any);
        assert_eq!(DueFilter::from_query(Some("PAST7")), DueFilter::Any);
    }
}
