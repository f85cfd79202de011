use axum::{
    extract::Query,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use maud::{html, Markup};

use crate::{
    forms::{AuthorForm, FieldErrors},
    models::{Author, Book},
    pagination::{requested_page, PageQuery, Paginator},
    routes::{books::book_table, components},
    schema::{author, book},
    State,
};

use super::{app_page, or_not_found, Id, Librarian, Page, RouteError, Visitor};

fn author_form(title: &str, form: &AuthorForm, errors: &FieldErrors) -> Markup {
    components::form_page(
        title,
        "Submit",
        html! {
            (components::text_input("first_name", "First name", &form.first_name, errors, true))
            (components::text_input("last_name", "Last name", &form.last_name, errors, true))
            (components::date_input("date_of_birth", "Date of birth", &form.date_of_birth, errors, None))
            (components::date_input("date_of_death", "Died", &form.date_of_death, errors, None))
        },
    )
}

async fn find_author(conn: &mut AsyncPgConnection, id: i32) -> Result<Author, RouteError> {
    author::table
        .find(id)
        .select(Author::as_select())
        .get_result(conn)
        .await
        .map_err(or_not_found)
}

pub(crate) async fn list_authors(
    state: State,
    Visitor(user): Visitor,
    Query(query): Query<PageQuery>,
) -> Result<Markup, RouteError> {
    let number = requested_page(query.page.as_deref()).ok_or(RouteError::NotFound)?;
    let mut conn = state.db.get().await?;

    let total: i64 = author::table.count().get_result(&mut conn).await?;
    let pages = Paginator::new(number, state.config.catalog.page_size, total)
        .ok_or(RouteError::NotFound)?;

    let authors: Vec<Author> = author::table
        .order((
            author::last_name.asc(),
            author::first_name.asc(),
            author::id.asc(),
        ))
        .limit(pages.per_page)
        .offset(pages.offset())
        .select(Author::as_select())
        .load(&mut conn)
        .await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Authors,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Author List"
                    @if librarian {
                        a .ms-2.btn.btn-primary.btn-sm href="/author/create" { i .bi.bi-plus-lg {} }
                    }
                }
                @if authors.is_empty() {
                    p { "There are no authors in the library." }
                }
                ul {
                    @for author in &authors {
                        li {
                            a href=(format!("/author/{}", author.id)) { (author.to_string()) }
                            " " (author.lifespan())
                        }
                    }
                }
                (components::paginator(&pages, |n| format!("/authors?page={n}")))
            }
        },
    ))
}

pub(crate) async fn get_author(
    state: State,
    Visitor(user): Visitor,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let author = find_author(&mut conn, *id).await?;

    let books: Vec<Book> = Book::belonging_to(&author)
        .order((book::title.asc(), book::id.asc()))
        .select(Book::as_select())
        .load(&mut conn)
        .await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Authors,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Author: " (author.to_string())
                    @if librarian {
                        (components::edit_links(&format!("/author/{}", author.id)))
                    }
                }
                p { (author.lifespan()) }
                ."ms-3"."mt-4" {
                    h4 { "Books" }
                    (book_table(&mut conn, &books).await?)
                }
            }
        },
    ))
}

pub(crate) async fn create_author(Librarian(user): Librarian) -> Markup {
    app_page(
        Page::Authors,
        Some(&user),
        author_form(
            "Create author",
            &AuthorForm::default(),
            &FieldErrors::default(),
        ),
    )
}

pub(crate) async fn do_create_author(
    state: State,
    Librarian(user): Librarian,
    Form(form): Form<AuthorForm>,
) -> Result<Response, RouteError> {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => {
            return Ok(app_page(
                Page::Authors,
                Some(&user),
                author_form("Create author", &form, &errors),
            )
            .into_response())
        }
    };

    let mut conn = state.db.get().await?;

    let id: i32 = diesel::insert_into(author::table)
        .values(&new)
        .returning(author::id)
        .get_result(&mut conn)
        .await?;

    tracing::info!(
        "{} created author {id} ({}, {})",
        user.name,
        new.last_name,
        new.first_name
    );

    Ok(Redirect::to(&format!("/author/{id}")).into_response())
}

pub(crate) async fn update_author(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let author = find_author(&mut conn, *id).await?;

    Ok(app_page(
        Page::Authors,
        Some(&user),
        author_form(
            "Update author",
            &AuthorForm::from(&author),
            &FieldErrors::default(),
        ),
    ))
}

pub(crate) async fn do_update_author(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
    Form(form): Form<AuthorForm>,
) -> Result<Response, RouteError> {
    let changes = match form.validate() {
        Ok(changes) => changes,
        Err(errors) => {
            return Ok(app_page(
                Page::Authors,
                Some(&user),
                author_form("Update author", &form, &errors),
            )
            .into_response())
        }
    };

    let mut conn = state.db.get().await?;

    let updated = diesel::update(author::table.find(*id))
        .set(&changes)
        .execute(&mut conn)
        .await?;
    if updated == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} updated author {}", user.name, *id);

    Ok(Redirect::to(&format!("/author/{}", *id)).into_response())
}

pub(crate) async fn delete_author(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let author = find_author(&mut conn, *id).await?;

    let books: Vec<String> = Book::belonging_to(&author)
        .order(book::title.asc())
        .select(book::title)
        .load(&mut conn)
        .await?;

    Ok(app_page(
        Page::Authors,
        Some(&user),
        components::confirm_delete(
            "author",
            &author.to_string(),
            &format!("/author/{}", author.id),
            html! {
                @if !books.is_empty() {
                    p .text-warning { "The following books will no longer have an author:" }
                    ul .list-unstyled {
                        @for title in &books {
                            li { (title) }
                        }
                    }
                }
            },
        ),
    ))
}

pub(crate) async fn do_delete_author(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Redirect, RouteError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel::delete(author::table.find(*id))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} deleted author {}", user.name, *id);

    Ok(Redirect::to("/authors"))
}
