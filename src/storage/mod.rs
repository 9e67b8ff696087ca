mod calendars;
mod schema;
mod types;

pub use schema::Database;
pub use types::{CalendarFields, CalendarSource, DatabaseError, ValidationError};
