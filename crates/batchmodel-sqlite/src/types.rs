//! Binding `Value`s to statements and reading columns back.
//!
//! SQLite stores INTEGER, REAL, TEXT, BLOB and NULL. Dates and times are
//! written as ISO-8601 text, JSON as text and UUIDs as 16-byte blobs.
//! Everything comes back as one of the five storage classes.

use batchmodel_core::Value;
use libsqlite3_sys as ffi;
use std::ffi::{CStr, c_int};

/// Bind `value` to the 1-based parameter `index`.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: the caller guarantees `stmt`; text and blobs are copied by
    // SQLite (SQLITE_TRANSIENT) before the borrowed buffers go away.
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::TinyInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Decimal(s) | Value::Text(s) => bind_text(stmt, index, s),
            Value::Bytes(b) => bind_blob(stmt, index, b),
            Value::Uuid(bytes) => bind_blob(stmt, index, bytes),
            Value::Date(days) => bind_text(stmt, index, &format_date(*days)),
            Value::Time(micros) => bind_text(stmt, index, &format_time(*micros)),
            Value::Timestamp(micros) => bind_text(stmt, index, &format_timestamp(*micros)),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
        }
    }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    // SAFETY: see `bind_value`
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            text.as_ptr().cast(),
            text.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

unsafe fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8]) -> c_int {
    // SAFETY: see `bind_value`
    unsafe {
        ffi::sqlite3_bind_blob(
            stmt,
            index,
            bytes.as_ptr().cast(),
            bytes.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Read column `index` of the current row.
///
/// Integers come back as `BigInt`.
///
/// # Safety
/// `stmt` must have just returned `SQLITE_ROW`.
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: the caller guarantees a current row; text and blob pointers
    // are copied out before the next step.
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::BigInt(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    return Value::Null;
                }
                let slice = std::slice::from_raw_parts(ptr, len as usize);
                Value::Text(String::from_utf8_lossy(slice).into_owned())
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    return Value::Bytes(Vec::new());
                }
                Value::Bytes(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize).to_vec())
            }
            _ => Value::Null,
        }
    }
}

/// Name of result column `index`.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: SQLite owns the returned string until the statement is finalized
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}

/// Civil date of a day count relative to 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn format_date(days: i32) -> String {
    let (year, month, day) = civil_from_days(i64::from(days));
    format!("{year:04}-{month:02}-{day:02}")
}

fn format_time(micros: i64) -> String {
    let micros = micros.rem_euclid(86_400_000_000);
    let secs = micros / 1_000_000;
    let frac = micros % 1_000_000;
    let hms = format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if frac == 0 {
        hms
    } else {
        format!("{hms}.{frac:06}")
    }
}

fn format_timestamp(micros: i64) -> String {
    let days = micros.div_euclid(86_400_000_000);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02} {}",
        format_time(micros.rem_euclid(86_400_000_000))
    )
}
