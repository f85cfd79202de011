use axum::{
    response::{IntoResponse, Redirect, Response},
    Form,
};
use diesel::{
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use maud::{html, Markup};

use crate::{
    forms::{FieldErrors, LanguageForm, DUPLICATE_LANGUAGE},
    models::Language,
    routes::components,
    schema::language,
    State,
};

use super::{app_page, or_not_found, Id, Librarian, Page, RouteError, User, Visitor};

fn language_form(title: &str, form: &LanguageForm, errors: &FieldErrors) -> Markup {
    components::form_page(
        title,
        "Submit",
        components::text_input("name", "Name", &form.name, errors, true),
    )
}

async fn find_language(conn: &mut AsyncPgConnection, id: i32) -> Result<Language, RouteError> {
    language::table
        .find(id)
        .select(Language::as_select())
        .get_result(conn)
        .await
        .map_err(or_not_found)
}

/// The form again, with an error on the name, when the language already exists
fn on_duplicate(
    result: Result<i32, DieselError>,
    title: &str,
    user: &User,
    form: &LanguageForm,
) -> Result<Result<i32, Markup>, RouteError> {
    match result {
        Ok(id) => Ok(Ok(id)),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            let mut errors = FieldErrors::default();
            errors.add("name", DUPLICATE_LANGUAGE);
            Ok(Err(app_page(
                Page::Languages,
                Some(user),
                language_form(title, form, &errors),
            )))
        }
        Err(e) => Err(or_not_found(e)),
    }
}

pub(crate) async fn list_languages(
    state: State,
    Visitor(user): Visitor,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let languages: Vec<Language> = language::table
        .order(language::name.asc())
        .select(Language::as_select())
        .load(&mut conn)
        .await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Languages,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Language List"
                    @if librarian {
                        a .ms-2.btn.btn-primary.btn-sm href="/language/create" { i .bi.bi-plus-lg {} }
                    }
                }
                @if languages.is_empty() {
                    p { "There are no languages in the library." }
                }
                ul {
                    @for language in &languages {
                        li { a href=(format!("/language/{}", language.id)) { (language.name) } }
                    }
                }
            }
        },
    ))
}

pub(crate) async fn get_language(
    state: State,
    Visitor(user): Visitor,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let language = find_language(&mut conn, *id).await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Languages,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Language: " (language.name)
                    @if librarian {
                        (components::edit_links(&format!("/language/{}", language.id)))
                    }
                }
            }
        },
    ))
}

pub(crate) async fn create_language(Librarian(user): Librarian) -> Markup {
    app_page(
        Page::Languages,
        Some(&user),
        language_form(
            "Create language",
            &LanguageForm::default(),
            &FieldErrors::default(),
        ),
    )
}

pub(crate) async fn do_create_language(
    state: State,
    Librarian(user): Librarian,
    Form(form): Form<LanguageForm>,
) -> Result<Response, RouteError> {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => {
            return Ok(app_page(
                Page::Languages,
                Some(&user),
                language_form("Create language", &form, &errors),
            )
            .into_response())
        }
    };

    let mut conn = state.db.get().await?;

    let result = diesel::insert_into(language::table)
        .values(&new)
        .returning(language::id)
        .get_result(&mut conn)
        .await;

    let id = match on_duplicate(result, "Create language", &user, &form)? {
        Ok(id) => id,
        Err(page) => return Ok(page.into_response()),
    };

    tracing::info!("{} created language {id} ({})", user.name, new.name);

    Ok(Redirect::to(&format!("/language/{id}")).into_response())
}

pub(crate) async fn update_language(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let language = find_language(&mut conn, *id).await?;

    Ok(app_page(
        Page::Languages,
        Some(&user),
        language_form(
            "Update language",
            &LanguageForm::from(&language),
            &FieldErrors::default(),
        ),
    ))
}

pub(crate) async fn do_update_language(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
    Form(form): Form<LanguageForm>,
) -> Result<Response, RouteError> {
    let changes = match form.validate() {
        Ok(changes) => changes,
        Err(errors) => {
            return Ok(app_page(
                Page::Languages,
                Some(&user),
                language_form("Update language", &form, &errors),
            )
            .into_response())
        }
    };

    let mut conn = state.db.get().await?;

    let result = diesel::update(language::table.find(*id))
        .set(&changes)
        .returning(language::id)
        .get_result(&mut conn)
        .await;

    let id = match on_duplicate(result, "Update language", &user, &form)? {
        Ok(id) => id,
        Err(page) => return Ok(page.into_response()),
    };

    tracing::info!("{} renamed language {id} to {}", user.name, changes.name);

    Ok(Redirect::to(&format!("/language/{id}")).into_response())
}

pub(crate) async fn delete_language(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let language = find_language(&mut conn, *id).await?;

    Ok(app_page(
        Page::Languages,
        Some(&user),
        components::confirm_delete(
            "language",
            &language.name,
            &format!("/language/{}", language.id),
            html! {},
        ),
    ))
}

pub(crate) async fn do_delete_language(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Redirect, RouteError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel::delete(language::table.find(*id))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} deleted language {}", user.name, *id);

    Ok(Redirect::to("/languages"))
}
