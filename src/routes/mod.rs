use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::PoolError;
use diesel_async::RunQueryDsl;
use maud::{html, Markup};

use crate::{
    models::LoanStatus,
    schema::{author, book, bookinstance, genre},
    AppState, State,
};

pub(crate) mod authors;
pub(crate) mod books;
mod components;
pub(crate) mod genres;
pub(crate) mod instances;
pub(crate) mod languages;

/// Books whose title contains this word are counted on the home page
const TITLE_WORD: &str = " и ";

#[derive(thiserror::Error, Debug)]
pub(crate) enum RouteError {
    #[error("Database error")]
    Db(#[from] diesel::result::Error),
    #[error("Missing a user header")]
    NoUser,
    #[error("Could not parse user name")]
    InvalidUser(#[from] axum::http::header::ToStrError),
    #[error("Could not get a connection from the pool")]
    PoolError(#[from] PoolError),
    #[error("Requested resource was not found")]
    NotFound,
    #[error("User is not allowed to access this resource")]
    Forbidden,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> axum::response::Response {
        let (code, text) = match self {
            RouteError::Db(_) | RouteError::PoolError(_) => {
                tracing::error!("route error: {self} ({self:#?})");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error")
            }
            RouteError::NoUser | RouteError::Forbidden => {
                tracing::debug!("route error: {self}");
                (
                    StatusCode::FORBIDDEN,
                    "You do not have permission to access this page",
                )
            }
            RouteError::InvalidUser(_) => {
                tracing::warn!("route error: {self} ({self:#?})");
                (StatusCode::BAD_REQUEST, "Invalid user name")
            }
            RouteError::NotFound => (StatusCode::NOT_FOUND, "Page not found"),
        };

        (
            code,
            base_page(html! {
                .container.text-center."mt-4" {
                    h1 { (code.as_u16()) }
                    p { (text) }
                    a href="/" { "Back to the catalog" }
                }
            }),
        )
            .into_response()
    }
}

/// Turns a missing row into a 404
pub(crate) fn or_not_found(e: diesel::result::Error) -> RouteError {
    match e {
        diesel::result::Error::NotFound => RouteError::NotFound,
        _ => e.into(),
    }
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Page {
    Home,
    Books,
    Authors,
    Genres,
    Languages,
    Copies,
    Borrowed,
}

impl Page {
    fn variants(librarian: bool) -> &'static [Self] {
        match librarian {
            true => &[
                Self::Home,
                Self::Books,
                Self::Authors,
                Self::Genres,
                Self::Languages,
                Self::Copies,
                Self::Borrowed,
            ],
            false => &[
                Self::Home,
                Self::Books,
                Self::Authors,
                Self::Genres,
                Self::Languages,
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::Books => "All books",
            Page::Authors => "All authors",
            Page::Genres => "Genres",
            Page::Languages => "Languages",
            Page::Copies => "Copies",
            Page::Borrowed => "All borrowed",
        }
    }

    pub fn location(&self) -> &'static str {
        match self {
            Page::Home => "/",
            Page::Books => "/books",
            Page::Authors => "/authors",
            Page::Genres => "/genres",
            Page::Languages => "/languages",
            Page::Copies => "/bookinstances",
            Page::Borrowed => "/borrowed",
        }
    }
}

fn base_page(body: Markup) -> Markup {
    html! {
        (maud::DOCTYPE)
        html lang="en" data-bs-theme="dark" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Local Library" }
                link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/css/bootstrap.min.css"
                     rel="stylesheet"
                     integrity="sha384-T3c6CoIi6uLrA9TneNEoa7RxnatzjcDSCmG1MXxSR1GAsXEV/Dwwykc2MPK8M2HN"
                     crossorigin="anonymous";
                link rel="stylesheet"
                     href="https://cdn.jsdelivr.net/npm/bootstrap-icons@1.11.3/font/bootstrap-icons.min.css"
                     integrity="sha384-XGjxtQfXaH2tnPFa9x+ruJTuLE3Aa6LhHSWRr1XeTyhezb4abCG4ccI5AkVDxqC+"
                     crossorigin="anonymous";
            }
            body {
                (body)
                script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/js/bootstrap.bundle.min.js"
                       integrity="sha384-C6RzsynM9kWDrMNeT87bh95OGNyZPhcTNXj1NW7RuBCsyN/o0jlpcV8Qyq46cDfL"
                       crossorigin="anonymous" {}
            }
        }
    }
}

fn raw_app_page(page: Option<Page>, user: Option<&User>, body: Markup) -> Markup {
    let librarian = user.is_some_and(|u| u.librarian);

    base_page(html! {
        .container-fluid {
            header .d-flex
                   .flex-wrap
                   .align-items-center
                   .justify-content-center
                   .justify-content-md-between
                   ."py-3"."mb-4" {
                h2 ."col-md-3"."mb-2"."mb-md-0" {
                    a .d-inline-flex.link-body-emphasis.text-decoration-none href="/" {
                        i .bi.bi-book-half {}
                    }
                }
                ul .nav.nav-pills."col-12".col-md-auto."mb-2".justify-content-center."mb-md-0" {
                    @for p in Page::variants(librarian) {
                        @let current = Some(*p) == page;
                        li .nav-item {
                            a .nav-link.active[current]
                                aria-current=[current.then_some("page")]
                                href=(p.location()) {
                                (p.name())
                            }
                        }
                    }
                }
                ."col-md-3".text-end."me-2" {
                    @match user {
                        Some(user) => {
                            span .align-middle { (user.name) }
                            @if user.librarian {
                                span .badge.text-bg-secondary."ms-2" { "Librarian" }
                            }
                        }
                        None => {
                            span .align-middle.text-body-secondary { "Anonymous" }
                        }
                    }
                }
            }
            (body)
        }
    })
}

fn app_page(page: Page, user: Option<&User>, body: Markup) -> Markup {
    raw_app_page(Some(page), user, body)
}

/// A user authenticated by the reverse proxy in front of the catalog
#[derive(Debug, Clone)]
pub(crate) struct User {
    pub name: String,
    pub librarian: bool,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = RouteError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let name = match parts.headers.get(&state.config.auth.header) {
            Some(user) => user.to_str()?,
            None => match &state.config.debug.assume_user {
                Some(user) => user.as_str(),
                None => return Err(RouteError::NoUser),
            },
        };

        Ok(User {
            name: name.to_owned(),
            librarian: state.config.is_librarian(name),
        })
    }
}

/// The user of a public page, `None` for anonymous visitors
pub(crate) struct Visitor(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Visitor {
    type Rejection = RouteError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match User::from_request_parts(parts, state).await {
            Ok(user) => Ok(Visitor(Some(user))),
            Err(RouteError::NoUser) => Ok(Visitor(None)),
            Err(e) => Err(e),
        }
    }
}

/// A user allowed to change the catalog
pub(crate) struct Librarian(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Librarian {
    type Rejection = RouteError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = match User::from_request_parts(parts, state).await {
            Ok(user) => user,
            Err(RouteError::NoUser) => return Err(RouteError::Forbidden),
            Err(e) => return Err(e),
        };

        match user.librarian {
            true => Ok(Librarian(user)),
            false => {
                tracing::warn!("{} tried to access a librarian page", user.name);
                Err(RouteError::Forbidden)
            }
        }
    }
}

/// Identifier taken from the URL. One that does not parse names no page.
pub(crate) struct Id<T>(pub T);

impl<T> std::ops::Deref for Id<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for Id<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = RouteError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Id(id)),
            Err(e) => {
                tracing::debug!("invalid id in {}: {e}", parts.uri.path());
                Err(RouteError::NotFound)
            }
        }
    }
}

pub(crate) async fn not_found() -> RouteError {
    RouteError::NotFound
}

pub(crate) async fn index(state: State, Visitor(user): Visitor) -> Result<Markup, RouteError> {
    let mut conn = state.db.get().await?;

    let num_books: i64 = book::table.count().get_result(&mut conn).await?;
    let num_instances: i64 = bookinstance::table.count().get_result(&mut conn).await?;
    let num_instances_available: i64 = bookinstance::table
        .filter(bookinstance::status.eq(LoanStatus::Available))
        .count()
        .get_result(&mut conn)
        .await?;
    let num_authors: i64 = author::table.count().get_result(&mut conn).await?;
    let num_genres: i64 = genre::table.count().get_result(&mut conn).await?;
    let num_books_with_word: i64 = book::table
        .filter(book::title.like(format!("%{TITLE_WORD}%")))
        .count()
        .get_result(&mut conn)
        .await?;

    Ok(app_page(
        Page::Home,
        user.as_ref(),
        html! {
            .container {
                h1 { "Local Library Home" }
                p {
                    "Welcome to the Local Library, a catalog of the books, authors and copies "
                    "available for loan."
                }
                h2 { "Dynamic content" }
                p { "The library has the following record counts:" }
                ul {
                    li { strong { "Books: " } (num_books) }
                    li { strong { "Copies: " } (num_instances) }
                    li { strong { "Copies available: " } (num_instances_available) }
                    li { strong { "Authors: " } (num_authors) }
                    li { strong { "Genres: " } (num_genres) }
                    li { strong { "Books with \"" (TITLE_WORD.trim()) "\" in the title: " } (num_books_with_word) }
                }
            }
        },
    ))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{HeaderValue, Request, StatusCode},
        Router,
    };
    use diesel_async::{
        pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
        AsyncPgConnection,
    };
    use tower::ServiceExt;

    use crate::{router, AppState, Config};

    const COPY: &str = "/bookinstance/67e55044-10b1-426f-9247-bb680e5fe0c8";

    /// A router whose database is never reached by the requests below
    fn app(debug: &str) -> Router {
        let config: Config = toml::from_str(&format!(
            r#"
            {debug}

            [auth]
            header = "Remote-User"
            librarians = ["alice"]

            [database]
            url = "postgres://nobody@localhost/nothing"

            [server]
            port = 8080
            "#
        ))
        .unwrap();

        let db = Pool::builder(AsyncDieselConnectionManager::<AsyncPgConnection>::new(
            &config.database.url,
        ))
        .build()
        .unwrap();

        router(Arc::new(AppState { config, db }))
    }

    async fn status(app: &Router, method: &str, uri: &str, user: Option<&[u8]>) -> StatusCode {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header("Remote-User", HeaderValue::from_bytes(user).unwrap());
        }

        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    fn librarian_pages() -> Vec<(&'static str, String)> {
        let mut pages = vec![
            ("GET", "/bookinstances".to_owned()),
            ("GET", "/borrowed".to_owned()),
            ("GET", format!("{COPY}/renew")),
            ("POST", format!("{COPY}/renew")),
            ("GET", "/bookinstance/create".to_owned()),
            ("POST", "/bookinstance/create".to_owned()),
            ("GET", format!("{COPY}/update")),
            ("POST", format!("{COPY}/delete")),
        ];

        for entity in ["book", "author", "genre", "language"] {
            pages.push(("GET", format!("/{entity}/create")));
            pages.push(("POST", format!("/{entity}/create")));
            pages.push(("GET", format!("/{entity}/1/update")));
            pages.push(("POST", format!("/{entity}/1/update")));
            pages.push(("GET", format!("/{entity}/1/delete")));
            pages.push(("POST", format!("/{entity}/1/delete")));
        }

        pages
    }

    #[tokio::test]
    async fn anonymous_cannot_edit() {
        let app = app("");

        for (method, uri) in librarian_pages() {
            assert_eq!(
                status(&app, method, &uri, None).await,
                StatusCode::FORBIDDEN,
                "{method} {uri}"
            );
        }
    }

    #[tokio::test]
    async fn readers_cannot_edit() {
        let app = app("");

        for (method, uri) in librarian_pages() {
            assert_eq!(
                status(&app, method, &uri, Some(b"carol")).await,
                StatusCode::FORBIDDEN,
                "{method} {uri}"
            );
        }
    }

    #[tokio::test]
    async fn librarian_form() {
        let app = app("");

        assert_eq!(
            status(&app, "GET", "/author/create", Some(b"alice")).await,
            StatusCode::OK
        );
        assert_eq!(
            status(&app, "GET", "/genre/create", Some(b"alice")).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn invalid_user_header() {
        let app = app("");
        let user: &[u8] = b"\xff\xfe";

        for uri in ["/", "/books", "/book/1", "/authors", COPY, "/borrowed", "/genre/create"] {
            assert_eq!(
                status(&app, "GET", uri, Some(user)).await,
                StatusCode::BAD_REQUEST,
                "{uri}"
            );
        }
    }

    #[tokio::test]
    async fn assumed_user() {
        let app = app("[debug]\nassume_user = \"alice\"");
        assert_eq!(
            status(&app, "GET", "/language/create", None).await,
            StatusCode::OK
        );
        assert_eq!(
            status(&app, "GET", "/language/create", Some(b"carol")).await,
            StatusCode::FORBIDDEN
        );

        let app = self::app("[debug]\nassume_user = \"carol\"");
        assert_eq!(
            status(&app, "GET", "/language/create", None).await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn malformed_ids() {
        let app = app("");

        for uri in [
            "/book/abc",
            "/book/99999999999",
            "/author/abc",
            "/genre/1x",
            "/language/-",
            "/bookinstance/not-a-uuid",
        ] {
            assert_eq!(
                status(&app, "GET", uri, None).await,
                StatusCode::NOT_FOUND,
                "{uri}"
            );
        }

        assert_eq!(
            status(&app, "GET", "/book/abc/update", Some(b"alice")).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(&app, "POST", "/bookinstance/1/delete", Some(b"alice")).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn malformed_pages() {
        let app = app("");

        for uri in ["/books?page=0", "/books?page=last", "/authors?page=-2"] {
            assert_eq!(
                status(&app, "GET", uri, None).await,
                StatusCode::NOT_FOUND,
                "{uri}"
            );
        }
        assert_eq!(
            status(&app, "GET", "/bookinstances?page=x", Some(b"alice")).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn unknown_route() {
        assert_eq!(
            status(&app(""), "GET", "/catalog", None).await,
            StatusCode::NOT_FOUND
        );
    }
}
