use std::fmt::Display;

use chrono::NaiveDate;
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    prelude::*,
    serialize::ToSql,
    sql_types::Text,
};
use uuid::Uuid;

#[derive(Queryable, Selectable, Identifiable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::genre)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Insertable, AsChangeset, PartialEq, Debug)]
#[diesel(table_name = crate::schema::genre)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewGenre {
    pub name: String,
}

#[derive(Queryable, Selectable, Identifiable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::language)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Language {
    pub id: i32,
    pub name: String,
}

#[derive(Insertable, AsChangeset, PartialEq, Debug)]
#[diesel(table_name = crate::schema::language)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewLanguage {
    pub name: String,
}

#[derive(Queryable, Selectable, Identifiable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::author)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Author {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
}

impl Author {
    /// Life span as shown next to the name, e.g. `(1920-01-02 - 1992-04-06)`
    pub fn lifespan(&self) -> String {
        let fmt = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        format!(
            "({} - {})",
            fmt(self.date_of_birth),
            fmt(self.date_of_death)
        )
    }
}

impl Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Insertable, AsChangeset, PartialEq, Debug)]
#[diesel(table_name = crate::schema::author)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct NewAuthor {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, PartialEq, Debug, Clone)]
#[diesel(belongs_to(Author, foreign_key = author))]
#[diesel(table_name = crate::schema::book)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: Option<i32>,
    pub summary: String,
    pub isbn: String,
}

#[derive(Insertable, AsChangeset, PartialEq, Debug)]
#[diesel(table_name = crate::schema::book)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct NewBook {
    pub title: String,
    pub author: Option<i32>,
    pub summary: String,
    pub isbn: String,
}

/// Names of the first three genres, as shown in book listings
pub fn display_genre(genres: &[Genre]) -> String {
    genres
        .iter()
        .take(3)
        .map(|g| g.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Insertable, Identifiable, Selectable, Queryable, Associations, Debug)]
#[diesel(belongs_to(Book, foreign_key = book))]
#[diesel(belongs_to(Genre, foreign_key = genre))]
#[diesel(table_name = crate::schema::bookgenre)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(primary_key(book, genre))]
pub struct BookGenre {
    pub book: i32,
    pub genre: i32,
}

#[derive(AsExpression, FromSqlRow, Default, Debug, Clone, Copy, PartialEq, Eq)]
#[diesel(sql_type = Text)]
pub enum LoanStatus {
    #[default]
    Maintenance,
    OnLoan,
    Available,
    Reserved,
}

impl LoanStatus {
    pub fn all() -> &'static [Self] {
        &[
            Self::Maintenance,
            Self::OnLoan,
            Self::Available,
            Self::Reserved,
        ]
    }

    /// One letter code stored in the database and sent by forms
    pub fn code(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "m",
            LoanStatus::OnLoan => "o",
            LoanStatus::Available => "a",
            LoanStatus::Reserved => "r",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.code() == code)
    }
}

impl Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoanStatus::Maintenance => "Maintenance",
            LoanStatus::OnLoan => "On loan",
            LoanStatus::Available => "Available",
            LoanStatus::Reserved => "Reserved",
        };
        f.write_str(name)
    }
}

impl<DB> ToSql<Text, DB> for LoanStatus
where
    DB: Backend,
    str: ToSql<Text, DB>,
{
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, DB>,
    ) -> diesel::serialize::Result {
        <str as ToSql<Text, DB>>::to_sql(self.code(), out)
    }
}

impl<DB> FromSql<Text, DB> for LoanStatus
where
    DB: Backend,
    String: FromSql<Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let code = String::from_sql(bytes)?;
        LoanStatus::from_code(&code).ok_or_else(|| format!("Unknown loan status '{code}'").into())
    }
}

#[derive(Queryable, Selectable, Identifiable, Associations, PartialEq, Debug, Clone)]
#[diesel(belongs_to(Book, foreign_key = book))]
#[diesel(table_name = crate::schema::bookinstance)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookInstance {
    pub id: Uuid,
    pub book: Option<i32>,
    pub imprint: String,
    pub due_back: Option<NaiveDate>,
    pub status: LoanStatus,
}

impl BookInstance {
    /// `title` is the title of the copied book, if it still exists
    pub fn label(&self, title: Option<&str>) -> String {
        format!("{} ({})", self.id, title.unwrap_or("no book"))
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_back.is_some_and(|d| d < today)
    }
}

#[derive(Insertable, PartialEq, Debug)]
#[diesel(table_name = crate::schema::bookinstance)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewBookInstance {
    pub id: Uuid,
    #[diesel(embed)]
    pub fields: BookInstanceEdit,
}

#[derive(Insertable, AsChangeset, PartialEq, Debug)]
#[diesel(table_name = crate::schema::bookinstance)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct BookInstanceEdit {
    pub book: Option<i32>,
    pub imprint: String,
    pub due_back: Option<NaiveDate>,
    pub status: LoanStatus,
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use expect_test::expect;
    use uuid::Uuid;

    use super::{display_genre, Author, BookInstance, Genre, LoanStatus};

    fn genre(id: i32, name: &str) -> Genre {
        Genre {
            id,
            name: name.into(),
        }
    }

    #[test]
    fn status_codes() {
        for status in LoanStatus::all() {
            assert_eq!(LoanStatus::from_code(status.code()), Some(*status));
        }
        assert_eq!(LoanStatus::from_code("x"), None);
        assert_eq!(LoanStatus::from_code(""), None);
        assert_eq!(LoanStatus::default(), LoanStatus::Maintenance);
        assert_eq!(LoanStatus::OnLoan.to_string(), "On loan");
    }

    #[test]
    fn author_display() {
        let mut author = Author {
            id: 1,
            first_name: "Isaac".into(),
            last_name: "Asimov".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1920, 1, 2),
            date_of_death: NaiveDate::from_ymd_opt(1992, 4, 6),
        };

        expect!["Asimov, Isaac"].assert_eq(&author.to_string());
        expect!["(1920-01-02 - 1992-04-06)"].assert_eq(&author.lifespan());

        author.date_of_death = None;
        expect!["(1920-01-02 - )"].assert_eq(&author.lifespan());
    }

    #[test]
    fn genre_summary() {
        let genres = [
            genre(1, "Fantasy"),
            genre(2, "Science Fiction"),
            genre(3, "Horror"),
            genre(4, "Poetry"),
        ];

        expect!["Fantasy, Science Fiction, Horror"].assert_eq(&display_genre(&genres));
        expect!["Fantasy"].assert_eq(&display_genre(&genres[..1]));
        expect![""].assert_eq(&display_genre(&[]));
    }

    #[test]
    fn instance_label() {
        let instance = BookInstance {
            id: Uuid::nil(),
            book: None,
            imprint: "Penguin".into(),
            due_back: NaiveDate::from_ymd_opt(2024, 3, 1),
            status: LoanStatus::OnLoan,
        };

        expect!["00000000-0000-0000-0000-000000000000 (Dune)"]
            .assert_eq(&instance.label(Some("Dune")));
        expect!["00000000-0000-0000-0000-000000000000 (no book)"]
            .assert_eq(&instance.label(None));

        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert!(instance.is_overdue(today));
        assert!(!instance.is_overdue(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    }
}
