//! Built-in function registry.
//!
//! Names are matched case-insensitively. Unknown names fail the evaluation,
//! not the parse, so formulas written against a newer registry still parse.

use chrono::{Datelike, Utc};

use crate::eval::{EvalError, EvalValue};

/// Dispatch a function call. Arguments are already evaluated.
pub fn call(name: &str, args: &[EvalValue]) -> Result<EvalValue, EvalError> {
    match name.to_ascii_uppercase().as_str() {
        "TRUE" => nullary(name, args, EvalValue::Bool(true)),
        "FALSE" => nullary(name, args, EvalValue::Bool(false)),
        "NULL" => nullary(name, args, EvalValue::Null),
        "NOW" => nullary(name, args, EvalValue::Date(Utc::now())),
        "TODAY" => {
            let today = Utc::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|ndt| chrono::TimeZone::from_utc_datetime(&Utc, &ndt))
                .unwrap_or_else(Utc::now);
            nullary(name, args, EvalValue::Date(today))
        }
        "UPPER" => unary_text(name, args, |s| EvalValue::Text(s.to_uppercase())),
        "LOWER" => unary_text(name, args, |s| EvalValue::Text(s.to_lowercase())),
        "TRIM" => unary_text(name, args, |s| EvalValue::Text(s.trim().to_string())),
        "LEN" => unary_text(name, args, |s| {
            EvalValue::Number(s.chars().count() as f64)
        }),
        "FLOOR" => {
            let [arg] = exact::<1>(name, args)?;
            match arg {
                EvalValue::Number(n) => Ok(EvalValue::Number(n.floor())),
                other => Err(EvalError::bad_argument(format!(
                    "FLOOR expects a number, got {:?}",
                    other.to_text()
                ))),
            }
        }
        "IF" => {
            let [cond, when_true, when_false] = exact::<3>(name, args)?;
            Ok(if cond.is_truthy() {
                when_true.clone()
            } else {
                when_false.clone()
            })
        }
        "DATEDIF" => datedif(name, args),
        _ => Err(EvalError::unknown_function(name)),
    }
}

fn exact<'a, const N: usize>(
    name: &str,
    args: &'a [EvalValue],
) -> Result<&'a [EvalValue; N], EvalError> {
    args.try_into()
        .map_err(|_| EvalError::wrong_arity(name, N, args.len()))
}

fn nullary(name: &str, args: &[EvalValue], value: EvalValue) -> Result<EvalValue, EvalError> {
    let [] = exact::<0>(name, args)?;
    Ok(value)
}

fn unary_text(
    name: &str,
    args: &[EvalValue],
    f: impl Fn(&str) -> EvalValue,
) -> Result<EvalValue, EvalError> {
    let [arg] = exact::<1>(name, args)?;
    Ok(f(&arg.to_text()))
}

/// `DATEDIF(start, end, unit)` with unit `"d"`, `"m"` or `"y"`.
fn datedif(name: &str, args: &[EvalValue]) -> Result<EvalValue, EvalError> {
    let [start, end, unit] = exact::<3>(name, args)?;
    let start = start
        .as_date()
        .ok_or_else(|| EvalError::bad_argument("DATEDIF start is not a date"))?;
    let end = end
        .as_date()
        .ok_or_else(|| EvalError::bad_argument("DATEDIF end is not a date"))?;
    let diff = match unit.to_text().to_ascii_lowercase().as_str() {
        "d" => (end.date_naive() - start.date_naive()).num_days() as f64,
        "m" => {
            let months = (end.year() - start.year()) * 12 + end.month() as i32
                - start.month() as i32;
            months as f64
        }
        "y" => (end.year() - start.year()) as f64,
        other => {
            return Err(EvalError::bad_argument(format!(
                "DATEDIF unit must be d, m or y, got {other:?}"
            )))
        }
    };
    Ok(EvalValue::Number(diff))
}
