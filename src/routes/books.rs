use axum::{
    extract::Query,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::Form;
use diesel::prelude::*;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use maud::{html, Markup, PreEscaped};

use crate::{
    forms::{BookForm, FieldErrors, ValidBook, INVALID_CHOICE},
    models::{display_genre, Author, Book, BookGenre, BookInstance, Genre, LoanStatus},
    pagination::{requested_page, PageQuery, Paginator},
    routes::components::{self, edit_links, status_badge},
    schema::{author, book, bookgenre, bookinstance, genre},
    State,
};

use super::{app_page, or_not_found, Id, Librarian, Page, RouteError, Visitor};

/// Genres of each book, in the same order as `books`
pub(crate) async fn genres_of(
    conn: &mut AsyncPgConnection,
    books: &[Book],
) -> Result<Vec<Vec<Genre>>, RouteError> {
    let genres = BookGenre::belonging_to(books)
        .inner_join(genre::table)
        .order(genre::name.asc())
        .select((BookGenre::as_select(), Genre::as_select()))
        .load::<(BookGenre, Genre)>(conn)
        .await?;

    Ok(genres
        .grouped_by(books)
        .into_iter()
        .map(|g| g.into_iter().map(|(_, genre)| genre).collect())
        .collect())
}

/// Table of books with their author and main genres
pub(crate) async fn book_table(
    conn: &mut AsyncPgConnection,
    books: &[Book],
) -> Result<Markup, RouteError> {
    let author_ids: Vec<i32> = books.iter().filter_map(|b| b.author).collect();
    let authors: Vec<Author> = author::table
        .filter(author::id.eq_any(&author_ids))
        .select(Author::as_select())
        .load(conn)
        .await?;

    let genres = genres_of(conn, books).await?;

    Ok(html! {
        @if books.is_empty() {
            p { "There are no books in the library." }
        } @else {
            table .table {
                thead {
                    tr {
                        th scope="col" { "Title" }
                        th scope="col" { "Author" }
                        th scope="col" { "Genre" }
                    }
                }
                tbody {
                    @for (book, genres) in books.iter().zip(genres) {
                        tr {
                            td { a href=(format!("/book/{}", book.id)) { (book.title) } }
                            td {
                                @if let Some(author) = authors.iter().find(|a| Some(a.id) == book.author) {
                                    a href=(format!("/author/{}", author.id)) { (author.to_string()) }
                                }
                            }
                            td { (display_genre(&genres)) }
                        }
                    }
                }
            }
        }
    })
}

pub(crate) async fn list_books(
    state: State,
    Visitor(user): Visitor,
    Query(query): Query<PageQuery>,
) -> Result<Markup, RouteError> {
    let number = requested_page(query.page.as_deref()).ok_or(RouteError::NotFound)?;
    let mut conn = state.db.get().await?;

    let total: i64 = book::table.count().get_result(&mut conn).await?;
    let pages = Paginator::new(number, state.config.catalog.page_size, total)
        .ok_or(RouteError::NotFound)?;

    let books: Vec<Book> = book::table
        .order((book::title.asc(), book::id.asc()))
        .limit(pages.per_page)
        .offset(pages.offset())
        .select(Book::as_select())
        .load(&mut conn)
        .await?;

    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Books,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Book List"
                    @if librarian {
                        a .ms-2.btn.btn-primary.btn-sm href="/book/create" { i .bi.bi-plus-lg {} }
                    }
                }
                (book_table(&mut conn, &books).await?)
                (components::paginator(&pages, |n| format!("/books?page={n}")))
            }
        },
    ))
}

pub(crate) async fn get_book(
    state: State,
    Visitor(user): Visitor,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let book = book::table
        .find(*id)
        .select(Book::as_select())
        .get_result(&mut conn)
        .await
        .map_err(or_not_found)?;

    let author = match book.author {
        Some(author_id) => author::table
            .find(author_id)
            .select(Author::as_select())
            .first(&mut conn)
            .await
            .optional()?,
        None => None,
    };

    let genres = BookGenre::belonging_to(&book)
        .inner_join(genre::table)
        .order(genre::name.asc())
        .select(Genre::as_select())
        .load::<Genre>(&mut conn)
        .await?;

    let copies = BookInstance::belonging_to(&book)
        .order((bookinstance::due_back.asc(), bookinstance::id.asc()))
        .select(BookInstance::as_select())
        .load::<BookInstance>(&mut conn)
        .await?;

    let summary = ammonia::clean(&book.summary);
    let librarian = user.as_ref().is_some_and(|u| u.librarian);

    Ok(app_page(
        Page::Books,
        user.as_ref(),
        html! {
            .container {
                h1 {
                    "Title: " (book.title)
                    @if librarian {
                        (edit_links(&format!("/book/{}", book.id)))
                    }
                }
                p {
                    strong { "Author: " }
                    @match &author {
                        Some(author) => {
                            a href=(format!("/author/{}", author.id)) { (author.to_string()) }
                        }
                        None => { "Unknown" }
                    }
                }
                p { strong { "Summary: " } (PreEscaped(summary)) }
                p { strong { "ISBN: " } (book.isbn) }
                p {
                    strong { "Genre: " }
                    @for (i, genre) in genres.iter().enumerate() {
                        @if i != 0 {
                            ", "
                        }
                        a href=(format!("/genre/{}", genre.id)) { (genre.name) }
                    }
                }

                ."ms-3"."mt-4" {
                    h4 {
                        "Copies"
                        @if librarian {
                            a .ms-2.btn.btn-primary.btn-sm
                                href=(format!("/bookinstance/create?book={}", book.id)) {
                                i .bi.bi-plus-lg {}
                            }
                        }
                    }
                    @if copies.is_empty() {
                        p { "There are no copies of this book in the library." }
                    }
                    @for copy in &copies {
                        hr;
                        p { (status_badge(copy.status)) }
                        @if copy.status != LoanStatus::Available {
                            @if let Some(due) = copy.due_back {
                                p { strong { "Due to be returned: " } (due.to_string()) }
                            }
                        }
                        p { strong { "Imprint: " } (copy.imprint) }
                        p .text-body-secondary {
                            strong { "Id: " }
                            a href=(format!("/bookinstance/{}", copy.id)) { (copy.id.to_string()) }
                            @if librarian {
                                (edit_links(&format!("/bookinstance/{}", copy.id)))
                            }
                        }
                    }
                }
            }
        },
    ))
}

async fn book_form(
    conn: &mut AsyncPgConnection,
    title: &str,
    form: &BookForm,
    errors: &FieldErrors,
) -> Result<Markup, RouteError> {
    let authors: Vec<(String, String)> = author::table
        .order((author::last_name.asc(), author::first_name.asc(), author::id.asc()))
        .select(Author::as_select())
        .load::<Author>(conn)
        .await?
        .into_iter()
        .map(|a| (a.id.to_string(), a.to_string()))
        .collect();

    let genres: Vec<(String, String)> = genre::table
        .order(genre::name.asc())
        .select(Genre::as_select())
        .load::<Genre>(conn)
        .await?
        .into_iter()
        .map(|g| (g.id.to_string(), g.name))
        .collect();

    Ok(components::form_page(
        title,
        "Submit",
        html! {
            (components::text_input("title", "Title", &form.title, errors, true))
            (components::select_input("author", "Author", &authors, std::slice::from_ref(&form.author), false, errors))
            (components::textarea_input("summary", "Summary", &form.summary, errors))
            (components::text_input("isbn", "ISBN", &form.isbn, errors, true))
            (components::select_input("genre", "Genre", &genres, &form.genre, true, errors))
        },
    ))
}

/// Validates the form, checking that the referenced author and genres exist
async fn check_book(
    conn: &mut AsyncPgConnection,
    form: &BookForm,
) -> Result<Result<ValidBook, FieldErrors>, RouteError> {
    let valid = match form.validate() {
        Ok(v) => v,
        Err(errors) => return Ok(Err(errors)),
    };

    let mut errors = FieldErrors::default();

    if let Some(author_id) = valid.book.author {
        let found: i64 = author::table
            .filter(author::id.eq(author_id))
            .count()
            .get_result(conn)
            .await?;
        if found == 0 {
            errors.add("author", INVALID_CHOICE);
        }
    }

    let found: i64 = genre::table
        .filter(genre::id.eq_any(&valid.genres))
        .count()
        .get_result(conn)
        .await?;
    if found != valid.genres.len() as i64 {
        errors.add("genre", INVALID_CHOICE);
    }

    Ok(match errors.is_empty() {
        true => Ok(valid),
        false => Err(errors),
    })
}

fn genre_links(book: i32, genres: &[i32]) -> Vec<BookGenre> {
    genres
        .iter()
        .map(|&genre| BookGenre { book, genre })
        .collect()
}

pub(crate) async fn create_book(
    state: State,
    Librarian(user): Librarian,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    Ok(app_page(
        Page::Books,
        Some(&user),
        book_form(
            &mut conn,
            "Create book",
            &BookForm::default(),
            &FieldErrors::default(),
        )
        .await?,
    ))
}

pub(crate) async fn do_create_book(
    state: State,
    Librarian(user): Librarian,
    Form(form): Form<BookForm>,
) -> Result<Response, RouteError> {
    let mut conn = state.db.get().await?;

    let valid = match check_book(&mut conn, &form).await? {
        Ok(v) => v,
        Err(errors) => {
            return Ok(app_page(
                Page::Books,
                Some(&user),
                book_form(&mut conn, "Create book", &form, &errors).await?,
            )
            .into_response())
        }
    };

    let valid = &valid;
    let id = conn
        .transaction(|c| {
            async move {
                let id: i32 = diesel::insert_into(book::table)
                    .values(&valid.book)
                    .returning(book::id)
                    .get_result(c)
                    .await?;

                diesel::insert_into(bookgenre::table)
                    .values(&genre_links(id, &valid.genres))
                    .execute(c)
                    .await?;

                Ok::<_, RouteError>(id)
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!("{} created book {id} ({})", user.name, valid.book.title);

    Ok(Redirect::to(&format!("/book/{id}")).into_response())
}

pub(crate) async fn update_book(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let book = book::table
        .find(*id)
        .select(Book::as_select())
        .get_result(&mut conn)
        .await
        .map_err(or_not_found)?;

    let genres = BookGenre::belonging_to(&book)
        .inner_join(genre::table)
        .select(Genre::as_select())
        .load::<Genre>(&mut conn)
        .await?;

    let form = BookForm::from_book(&book, &genres);

    Ok(app_page(
        Page::Books,
        Some(&user),
        book_form(&mut conn, "Update book", &form, &FieldErrors::default()).await?,
    ))
}

pub(crate) async fn do_update_book(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
    Form(form): Form<BookForm>,
) -> Result<Response, RouteError> {
    let mut conn = state.db.get().await?;

    let valid = match check_book(&mut conn, &form).await? {
        Ok(v) => v,
        Err(errors) => {
            return Ok(app_page(
                Page::Books,
                Some(&user),
                book_form(&mut conn, "Update book", &form, &errors).await?,
            )
            .into_response())
        }
    };

    let id = *id;
    let valid = &valid;

    conn.transaction(|c| {
        async move {
            let updated = diesel::update(book::table.find(id))
                .set(&valid.book)
                .execute(c)
                .await?;
            if updated == 0 {
                return Err(RouteError::NotFound);
            }

            diesel::delete(bookgenre::table.filter(bookgenre::book.eq(id)))
                .execute(c)
                .await?;

            diesel::insert_into(bookgenre::table)
                .values(&genre_links(id, &valid.genres))
                .execute(c)
                .await?;

            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    tracing::info!("{} updated book {id}", user.name);

    Ok(Redirect::to(&format!("/book/{id}")).into_response())
}

pub(crate) async fn delete_book(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let book = book::table
        .find(*id)
        .select(Book::as_select())
        .get_result(&mut conn)
        .await
        .map_err(or_not_found)?;

    let copies: i64 = BookInstance::belonging_to(&book)
        .count()
        .get_result(&mut conn)
        .await?;

    Ok(app_page(
        Page::Books,
        Some(&user),
        components::confirm_delete(
            "book",
            &book.title,
            &format!("/book/{}", book.id),
            html! {
                @if copies > 0 {
                    p .text-warning {
                        (format!("The {copies} copies of this book will be kept without a book."))
                    }
                }
            },
        ),
    ))
}

pub(crate) async fn do_delete_book(
    state: State,
    Librarian(user): Librarian,
    id: Id<i32>,
) -> Result<Redirect, RouteError> {
    let mut conn = state.db.get().await?;

    let deleted = diesel::delete(book::table.find(*id))
        .execute(&mut conn)
        .await?;
    if deleted == 0 {
        return Err(RouteError::NotFound);
    }

    tracing::info!("{} deleted book {}", user.name, *id);

    Ok(Redirect::to("/books"))
}
