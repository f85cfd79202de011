//! Form payloads and their validation.
//!
//! Forms are deserialized with every field as raw text so that invalid input can be shown
//! back to the user along with the errors.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

use crate::models::{
    Author, Book, BookInstance, BookInstanceEdit, Genre, Language, LoanStatus, NewAuthor, NewBook,
    NewGenre, NewLanguage,
};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_DATE: &str = "Enter a valid date.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const DUPLICATE_LANGUAGE: &str = "Language with this Name already exists.";
pub const DEATH_BEFORE_BIRTH: &str = "Date of death cannot be earlier than date of birth.";
pub const RENEWAL_IN_PAST: &str = "Invalid date - renewal in past";
pub const RENEWAL_TOO_FAR: &str = "Invalid date - renewal more than 4 weeks ahead";

/// Renewals can push the due date at most this far
pub const MAX_RENEWAL: Days = Days::new(4 * 7);
pub const DEFAULT_RENEWAL: Days = Days::new(3 * 7);

// Two digit years are tried first, "%Y" would read "24" as the year 24
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y"];

#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        match self.is_empty() {
            true => Ok(value),
            false => Err(self),
        }
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn text(errors: &mut FieldErrors, field: &'static str, value: &str, max: usize) -> String {
    let value = value.trim();
    let len = value.chars().count();

    if value.is_empty() {
        errors.add(field, REQUIRED);
    } else if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters (it has {len})."),
        );
    }

    value.to_owned()
}

fn optional_date(errors: &mut FieldErrors, field: &'static str, value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let date = parse_date(value);
    if date.is_none() {
        errors.add(field, INVALID_DATE);
    }
    date
}

fn required_date(errors: &mut FieldErrors, field: &'static str, value: &str) -> Option<NaiveDate> {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED);
        return None;
    }
    optional_date(errors, field, value)
}

fn choice(errors: &mut FieldErrors, field: &'static str, value: &str) -> Option<i32> {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, REQUIRED);
        return None;
    }

    let id = value.parse().ok();
    if id.is_none() {
        errors.add(field, INVALID_CHOICE);
    }
    id
}

fn date_value(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct GenreForm {
    pub name: String,
}

impl GenreForm {
    pub fn validate(&self) -> Result<NewGenre, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = text(&mut errors, "name", &self.name, 200);
        errors.finish(NewGenre { name })
    }
}

impl From<&Genre> for GenreForm {
    fn from(genre: &Genre) -> Self {
        Self {
            name: genre.name.clone(),
        }
    }
}

#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct LanguageForm {
    pub name: String,
}

impl LanguageForm {
    pub fn validate(&self) -> Result<NewLanguage, FieldErrors> {
        let mut errors = FieldErrors::default();
        let name = text(&mut errors, "name", &self.name, 200);
        errors.finish(NewLanguage { name })
    }
}

impl From<&Language> for LanguageForm {
    fn from(language: &Language) -> Self {
        Self {
            name: language.name.clone(),
        }
    }
}

#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct AuthorForm {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub date_of_death: String,
}

impl AuthorForm {
    pub fn validate(&self) -> Result<NewAuthor, FieldErrors> {
        let mut errors = FieldErrors::default();

        let first_name = text(&mut errors, "first_name", &self.first_name, 100);
        let last_name = text(&mut errors, "last_name", &self.last_name, 100);
        let date_of_birth = optional_date(&mut errors, "date_of_birth", &self.date_of_birth);
        let date_of_death = optional_date(&mut errors, "date_of_death", &self.date_of_death);

        if let (Some(birth), Some(death)) = (date_of_birth, date_of_death) {
            if death < birth {
                errors.add("date_of_death", DEATH_BEFORE_BIRTH);
            }
        }

        errors.finish(NewAuthor {
            first_name,
            last_name,
            date_of_birth,
            date_of_death,
        })
    }
}

impl From<&Author> for AuthorForm {
    fn from(author: &Author) -> Self {
        Self {
            first_name: author.first_name.clone(),
            last_name: author.last_name.clone(),
            date_of_birth: date_value(author.date_of_birth),
            date_of_death: date_value(author.date_of_death),
        }
    }
}

#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub summary: String,
    pub isbn: String,
    pub genre: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub struct ValidBook {
    pub book: NewBook,
    pub genres: Vec<i32>,
}

impl BookForm {
    pub fn from_book(book: &Book, genres: &[Genre]) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.map(|a| a.to_string()).unwrap_or_default(),
            summary: book.summary.clone(),
            isbn: book.isbn.clone(),
            genre: genres.iter().map(|g| g.id.to_string()).collect(),
        }
    }

    /// Checks the shape of the submitted book. Whether the author and genres exist is left to
    /// the caller.
    pub fn validate(&self) -> Result<ValidBook, FieldErrors> {
        let mut errors = FieldErrors::default();

        let title = text(&mut errors, "title", &self.title, 200);
        let author = choice(&mut errors, "author", &self.author);
        let summary = text(&mut errors, "summary", &self.summary, 1000);
        let isbn = text(&mut errors, "isbn", &self.isbn, 13);

        let mut genres = Vec::with_capacity(self.genre.len());
        for g in self.genre.iter().filter(|g| !g.trim().is_empty()) {
            match g.trim().parse() {
                Ok(id) if !genres.contains(&id) => genres.push(id),
                Ok(_) => (),
                Err(_) => {
                    errors.add("genre", INVALID_CHOICE);
                    break;
                }
            }
        }
        if genres.is_empty() && errors.get("genre").is_empty() {
            errors.add("genre", REQUIRED);
        }

        errors.finish(ValidBook {
            book: NewBook {
                title,
                author,
                summary,
                isbn,
            },
            genres,
        })
    }
}

#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct BookInstanceForm {
    pub book: String,
    pub imprint: String,
    pub due_back: String,
    pub status: String,
}

impl BookInstanceForm {
    pub fn for_book(book: Option<i32>) -> Self {
        Self {
            book: book.map(|b| b.to_string()).unwrap_or_default(),
            status: LoanStatus::default().code().to_owned(),
            ..Default::default()
        }
    }

    /// Whether the book exists is left to the caller
    pub fn validate(&self) -> Result<BookInstanceEdit, FieldErrors> {
        let mut errors = FieldErrors::default();

        let book = choice(&mut errors, "book", &self.book);
        let imprint = text(&mut errors, "imprint", &self.imprint, 200);
        let due_back = optional_date(&mut errors, "due_back", &self.due_back);

        let status = match self.status.trim() {
            "" => LoanStatus::default(),
            code => LoanStatus::from_code(code).unwrap_or_else(|| {
                errors.add(
                    "status",
                    format!("Select a valid choice. {code} is not one of the available choices."),
                );
                LoanStatus::default()
            }),
        };

        errors.finish(BookInstanceEdit {
            book,
            imprint,
            due_back,
            status,
        })
    }
}

impl From<&BookInstance> for BookInstanceForm {
    fn from(instance: &BookInstance) -> Self {
        Self {
            book: instance.book.map(|b| b.to_string()).unwrap_or_default(),
            imprint: instance.imprint.clone(),
            due_back: date_value(instance.due_back),
            status: instance.status.code().to_owned(),
        }
    }
}

#[derive(serde::Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct RenewBookForm {
    pub renewal_date: String,
}

impl RenewBookForm {
    /// Proposed renewal: three weeks from `today`
    pub fn initial(today: NaiveDate) -> Self {
        Self {
            renewal_date: date_value(today.checked_add_days(DEFAULT_RENEWAL)),
        }
    }

    /// The renewal date must lie between `today` and four weeks from it, both included
    pub fn validate(&self, today: NaiveDate) -> Result<NaiveDate, FieldErrors> {
        let mut errors = FieldErrors::default();

        let Some(date) = required_date(&mut errors, "renewal_date", &self.renewal_date) else {
            return Err(errors);
        };

        if date < today {
            errors.add("renewal_date", RENEWAL_IN_PAST);
        } else if today
            .checked_add_days(MAX_RENEWAL)
            .is_some_and(|limit| date > limit)
        {
            errors.add("renewal_date", RENEWAL_TOO_FAR);
        }

        errors.finish(date)
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use expect_test::expect;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn renew(date: &str) -> RenewBookForm {
        RenewBookForm {
            renewal_date: date.into(),
        }
    }

    #[test]
    fn renewal_bounds() {
        let today = day(2024, 2, 10);

        assert_eq!(renew("2024-02-10").validate(today), Ok(today));
        assert_eq!(renew("2024-03-09").validate(today), Ok(day(2024, 3, 9)));
        assert_eq!(renew("03/01/2024").validate(today), Ok(day(2024, 3, 1)));

        let past = renew("2024-02-09").validate(today).unwrap_err();
        assert_eq!(past.get("renewal_date"), [RENEWAL_IN_PAST]);

        let far = renew("2024-03-10").validate(today).unwrap_err();
        assert_eq!(far.get("renewal_date"), [RENEWAL_TOO_FAR]);

        let empty = renew(" ").validate(today).unwrap_err();
        assert_eq!(empty.get("renewal_date"), [REQUIRED]);

        let garbage = renew("next tuesday").validate(today).unwrap_err();
        assert_eq!(garbage.get("renewal_date"), [INVALID_DATE]);
    }

    #[test]
    fn renewal_default() {
        expect!["2024-03-02"].assert_eq(&RenewBookForm::initial(day(2024, 2, 10)).renewal_date);
    }

    #[test]
    fn author_form() {
        let form = AuthorForm {
            first_name: "  Ursula ".into(),
            last_name: "Le Guin".into(),
            date_of_birth: "1929-10-21".into(),
            date_of_death: "".into(),
        };

        let expected = expect![[r#"
            Ok(
                NewAuthor {
                    first_name: "Ursula",
                    last_name: "Le Guin",
                    date_of_birth: Some(
                        1929-10-21,
                    ),
                    date_of_death: None,
                },
            )
        "#]];
        expected.assert_debug_eq(&form.validate());

        let form = AuthorForm {
            first_name: "x".repeat(101),
            last_name: "".into(),
            date_of_birth: "1929-10-21".into(),
            date_of_death: "1900-01-01".into(),
        };

        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("first_name"),
            ["Ensure this value has at most 100 characters (it has 101)."]
        );
        assert_eq!(errors.get("last_name"), [REQUIRED]);
        assert_eq!(errors.get("date_of_death"), [DEATH_BEFORE_BIRTH]);
        assert!(errors.get("date_of_birth").is_empty());
    }

    #[test]
    fn book_form() {
        let form = BookForm {
            title: "The Dispossessed".into(),
            author: "3".into(),
            summary: "An ambiguous utopia.".into(),
            isbn: "9780061054884".into(),
            genre: vec!["2".into(), "".into(), "5".into(), "2".into()],
        };

        let valid = form.validate().unwrap();
        assert_eq!(valid.book.author, Some(3));
        assert_eq!(valid.genres, [2, 5]);

        let form = BookForm {
            isbn: "97800610548840".into(),
            author: "somebody".into(),
            genre: vec![],
            ..form
        };

        let errors = form.validate().unwrap_err();
        let expected = expect![[r#"
            FieldErrors(
                {
                    "author": [
                        "Select a valid choice. That choice is not one of the available choices.",
                    ],
                    "genre": [
                        "This field is required.",
                    ],
                    "isbn": [
                        "Ensure this value has at most 13 characters (it has 14).",
                    ],
                },
            )
        "#]];
        expected.assert_debug_eq(&errors);
    }

    #[test]
    fn instance_form() {
        let mut form = BookInstanceForm::for_book(Some(4));
        form.imprint = "Gollancz, 1975".into();

        let valid = form.validate().unwrap();
        assert_eq!(valid.book, Some(4));
        assert_eq!(valid.status, LoanStatus::Maintenance);
        assert_eq!(valid.due_back, None);

        form.status = "".into();
        form.due_back = "2024-05-01".into();
        let valid = form.validate().unwrap();
        assert_eq!(valid.status, LoanStatus::Maintenance);
        assert_eq!(valid.due_back, Some(day(2024, 5, 1)));

        form.status = "z".into();
        form.book = "".into();
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("status"),
            ["Select a valid choice. z is not one of the available choices."]
        );
        assert_eq!(errors.get("book"), [REQUIRED]);
    }

    #[test]
    fn names() {
        assert!(GenreForm { name: " ".into() }.validate().is_err());
        assert_eq!(
            LanguageForm {
                name: " Russian ".into()
            }
            .validate(),
            Ok(NewLanguage {
                name: "Russian".into()
            })
        );
    }

    #[test]
    fn date_formats() {
        assert_eq!(parse_date("2024-01-31"), Some(day(2024, 1, 31)));
        assert_eq!(parse_date("01/31/2024"), Some(day(2024, 1, 31)));
        assert_eq!(parse_date("01/31/24"), Some(day(2024, 1, 31)));
        assert_eq!(parse_date("31/01/2024"), None);
        assert_eq!(parse_date("2024-02-30"), None);
    }
}
