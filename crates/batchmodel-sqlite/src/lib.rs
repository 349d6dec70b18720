//! SQLite driver for BatchModel Rust.
//!
// FFI bindings require unsafe code
#![allow(unsafe_code)]
//!
//! `SqliteConnection` implements the `Connection` trait from
//! `batchmodel-core` on top of `libsqlite3-sys` with a bundled SQLite, so
//! batch commands can run against in-memory or file databases.
//!
//! # Example
//!
//! ```rust,ignore
//! use batchmodel_sqlite::SqliteConnection;
//! use batchmodel_core::{Connection, Cx, Outcome, Value};
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let cx = Cx::for_testing();
//! match conn.execute(&cx, "INSERT INTO users (name) VALUES (?1)", &[Value::Text("Alice".into())]).await {
//!     Outcome::Ok(n) => println!("inserted {n}"),
//!     Outcome::Err(e) => eprintln!("Error: {}", e),
//!     _ => {}
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool`, integers | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes`, `Uuid` | BLOB |
//! | `Date`, `Time`, `Timestamp` | TEXT (ISO-8601) |
//! | `Json` | TEXT |
//!
//! Integers are always read back as `Value::BigInt`.

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};

use std::ffi::CStr;

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string
    unsafe { CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}

/// Version number of the linked SQLite library, e.g. 3045001.
pub fn sqlite_version_number() -> i32 {
    // SAFETY: no preconditions
    unsafe { libsqlite3_sys::sqlite3_libversion_number() }
}
