use axum::{
    response::{IntoResponse, Redirect, Response},
    Form,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use maud::{html, Markup};

use crate::{
    forms::{FieldErrors, GenreForm},
    models::{Book, Genre},
    routes::{books::book_table, components},
    schema::{book, bookgenre, genre},
    State,
};

use super::{app_page, or_not_found, Id, Librarian, Page, RouteError, Visitor};

fn genre_form(title: &str, form: &GenreForm, errors: &FieldErrors) -> Markup {
    components::form_page(
        title,
        "Submit",
        components::text_input("name", "Name", &form.name, errors, true),
    )
}

async fn find_genre(conn: &mut AsyncPgConnection, id: i32) -> Result<Genre, RouteError> {
    genre::table
        .find(id)
        .select(Genre::as_select())
        .get_result(conn)
        .await
        .map_err(or_not_found)
}

pub(crate) async fn list_genres(
    state: State,
    Visitor(user): Visitor,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let genres: Vec<Genre> = genre::table
        .order((genre::name.asc(), genre::id.asc()))
        .select(Genre::as_select())
        .load(&mut conn)
        .await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Genres,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Genre List"
                    @if librarian {
                        a .ms-2.btn.btn-primary.btn-sm href="/genre/create" { i .bi.bi-plus-lg {} }
                    }
                }
                @if genres.is_empty() {
                    p { "There are no genres in the library." }
                }
                ul {
                    @for genre in &genres {
                        li { a href=(format!("/genre/{}", genre.id)) { (genre.name) } }
                    }
                }
            }
        },
    ))
}

pub(crate) async fn get_genre(
    state: State,
    Visitor(user): Visitor,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let genre = find_genre(&mut conn, *id).await?;

    let books: Vec<Book> = bookgenre::table
        .inner_join(book::table)
        .filter(bookgenre::genre.eq(genre.id))
        .order((book::title.asc(), book::id.asc()))
        .select(Book::as_select())
        .load(&mut conn)
        .await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Genres,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Genre: " (genre.name)
                    @if librarian {
                        (components::edit_links(&format!("/genre/{}", genre.id)))
                    }
                }
                (book_table(&mut conn, &books).await?)
            }
        },
    ))
}

pub(crate) async fn create_genre(Librarian(user): Librarian) -> Markup {
    app_page(
        Page::Genres,
        Some(&user),
        genre_form(
            "Create genre",
            &GenreForm::default(),
            &FieldErrors::default(),
        ),
    )
}

pub(crate) async fn do_create_genre(
    state: State,
    Librarian(user): Librarian,
    Form(form): Form<GenreForm>,
) -> Result<Response, RouteError> {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => {
            return Ok(app_page(
                Page::Genres,
                Some(&user),
                genre_form("Create genre", &form, &errors),
            )
            .into_response())
        }
    };

    let mut conn = state.db.get().await?;

    let id: i32 = diesel::insert_into(genre::table)
        .values(&new)
        .returning(genre::id)
        .get_result(&mut conn)
        .await?;

    tracing::info!("{} created genre {id} ({})", user.name, new.name);

    Ok(Redirect::to(&format!("/genre/{id}")).into_response())
}

pub(crate) async fn update_genre(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let genre = find_genre(&mut conn, *id).await?;

    Ok(app_page(
        Page::Genres,
        Some(&user),
        genre_form(
            "Update genre",
            &GenreForm::from(&genre),
            &FieldErrors::default(),
        ),
    ))
}

pub(crate) async fn do_update_genre(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
    Form(form): Form<GenreForm>,
) -> Result<Response, RouteError> {
    let changes = match form.validate() {
        Ok(changes) => changes,
        Err(errors) => {
            return Ok(app_page(
                Page::Genres,
                Some(&user),
                genre_form("Update genre", &form, &errors),
            )
            .into_response())
        }
    };

    let mut conn = state.db.get().await?;

    let updated = diesel::update(genre::table.find(*id))
        .set(&changes)
        .execute(&mut conn)
        .await?;
    if updated == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} renamed genre {} to {}", user.name, *id, changes.name);

    Ok(Redirect::to(&format!("/genre/{}", *id)).into_response())
}

pub(crate) async fn delete_genre(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;
    let genre = find_genre(&mut conn, *id).await?;

    let books: i64 = bookgenre::table
        .filter(bookgenre::genre.eq(genre.id))
        .count()
        .get_result(&mut conn)
        .await?;

    Ok(app_page(
        Page::Genres,
        Some(&user),
        components::confirm_delete(
            "genre",
            &genre.name,
            &format!("/genre/{}", genre.id),
            html! {
                @if books > 0 {
                    p .text-warning {
                        (format!("The genre will be removed from {books} books."))
                    }
                }
            },
        ),
    ))
}

pub(crate) async fn do_delete_genre(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Redirect, RouteError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel::delete(genre::table.find(*id))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} deleted genre {}", user.name, *id);

    Ok(Redirect::to("/genres"))
}
