//! Closed registry of named column functions.
//!
//! A call is written `name:arg1:...:result_column`. The registry maps the
//! normalized name (`-` and `_` are interchangeable, case-insensitive) to an
//! implementation that reads its argument columns and writes the result
//! column.

use crate::error::{PipelineError, Result};
use crate::pipeline::frame::{column_values, has_column, replace_column};
use crate::pipeline::hasher::ValueHasher;
use chrono::{NaiveDate, NaiveTime};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replacement for values that are not integers in `delete_cero`.
pub const NOT_AN_INTEGER: &str = "999999999999999999";

/// One parsed `name:args...:result` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<String>,
    pub result_column: String,
}

impl FunctionCall {
    /// Parses `name:arg...:result`. At least a name and a result column are
    /// required.
    pub fn parse(entry: &str) -> Result<Self> {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [name, args @ .., result] if !name.is_empty() && !result.is_empty() => Ok(Self {
                name: normalize_name(name),
                args: args.iter().map(|arg| (*arg).to_owned()).collect(),
                result_column: (*result).to_owned(),
            }),
            _ => Err(PipelineError::Config(format!(
                "Special function '{entry}' must look like name:args:result_column"
            ))),
        }
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().replace('-', "_").to_lowercase()
}

/// A named column function.
pub trait SpecialFunction: Send + Sync {
    /// Number of arguments between the name and the result column.
    fn arity(&self) -> usize;

    fn apply(
        &self,
        df: &mut DataFrame,
        call: &FunctionCall,
        hasher: &dyn ValueHasher,
    ) -> Result<()>;
}

pub struct FunctionRegistry {
    functions: BTreeMap<String, Box<dyn SpecialFunction>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Registry with every built-in function.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("concat_fields", Box::new(ConcatFields));
        registry.register("hash_if", Box::new(HashIf));
        registry.register(
            "skip_hash_traza_doc",
            Box::new(ValueMapper(skip_hash_traza_doc)),
        );
        registry.register("skip_hash_vale", Box::new(ValueMapper(skip_hash_vale)));
        registry.register("delete_cero", Box::new(ValueMapper(delete_cero)));
        registry.register("delete_any", Box::new(ValueMapper(delete_any)));
        registry
    }

    pub fn register(&mut self, name: &str, function: Box<dyn SpecialFunction>) {
        self.functions.insert(normalize_name(name), function);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SpecialFunction> {
        self.functions.get(&normalize_name(name)).map(|function| function.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Checks that `call` names a registered function with the right arity.
    pub fn check(&self, call: &FunctionCall) -> std::result::Result<(), String> {
        let function = self.get(&call.name).ok_or_else(|| {
            format!(
                "Unknown special function '{}' (available: {})",
                call.name,
                self.names().join(", ")
            )
        })?;
        if call.args.len() != function.arity() {
            return Err(format!(
                "Special function '{}' takes {} arguments, got {}",
                call.name,
                function.arity(),
                call.args.len()
            ));
        }
        Ok(())
    }
}

fn source_values(df: &DataFrame, call: &FunctionCall, column: &str) -> Result<Vec<String>> {
    if !has_column(df, column) {
        return Err(PipelineError::transform(
            "special_functions",
            format!("{}: column '{column}' not found", call.name),
        ));
    }
    column_values(df, column)
}

fn arity_error(call: &FunctionCall, expected: usize) -> PipelineError {
    PipelineError::transform(
        "special_functions",
        format!(
            "{} takes {expected} arguments, got {}",
            call.name,
            call.args.len()
        ),
    )
}

/// Single-column function applied cell by cell.
struct ValueMapper(fn(&str, &dyn ValueHasher) -> String);

impl SpecialFunction for ValueMapper {
    fn arity(&self) -> usize {
        1
    }

    fn apply(
        &self,
        df: &mut DataFrame,
        call: &FunctionCall,
        hasher: &dyn ValueHasher,
    ) -> Result<()> {
        let [source] = call.args.as_slice() else {
            return Err(arity_error(call, self.arity()));
        };
        let values = source_values(df, call, source)?;
        let mapped = values.iter().map(|value| (self.0)(value, hasher)).collect();
        replace_column(df, &call.result_column, mapped)
    }
}

/// `concat_fields:date_col:time_col:result`
struct ConcatFields;

impl SpecialFunction for ConcatFields {
    fn arity(&self) -> usize {
        2
    }

    fn apply(
        &self,
        df: &mut DataFrame,
        call: &FunctionCall,
        _hasher: &dyn ValueHasher,
    ) -> Result<()> {
        let [date_column, time_column] = call.args.as_slice() else {
            return Err(arity_error(call, self.arity()));
        };
        let dates = source_values(df, call, date_column)?;
        let times = source_values(df, call, time_column)?;
        let joined = dates
            .iter()
            .zip(&times)
            .map(|(date, time)| concat_date_time(date, time))
            .collect();
        replace_column(df, &call.result_column, joined)
    }
}

/// `YYYYMMDD` + `HHMMSS...` as `YYYY-MM-DD HH:MM:SS`, or both values joined by
/// a space when either does not parse.
pub fn concat_date_time(date: &str, time: &str) -> String {
    let clock: String = time.chars().take(6).collect();
    match (
        NaiveDate::parse_from_str(date, "%Y%m%d"),
        NaiveTime::parse_from_str(&clock, "%H%M%S"),
    ) {
        (Ok(date), Ok(clock)) => {
            format!("{} {}", date.format("%Y-%m-%d"), clock.format("%H:%M:%S"))
        }
        _ => format!("{date} {time}"),
    }
}

/// `hash_if:oper_col:product_col:mode_col:tx|oper:result`
struct HashIf;

impl SpecialFunction for HashIf {
    fn arity(&self) -> usize {
        4
    }

    fn apply(
        &self,
        df: &mut DataFrame,
        call: &FunctionCall,
        hasher: &dyn ValueHasher,
    ) -> Result<()> {
        let [oper_column, product_column, mode_column, wanted] = call.args.as_slice() else {
            return Err(arity_error(call, self.arity()));
        };
        let opers = source_values(df, call, oper_column)?;
        let products = source_values(df, call, product_column)?;
        let modes = source_values(df, call, mode_column)?;
        let want_tx = wanted == "tx";

        let result = opers
            .iter()
            .zip(&products)
            .zip(&modes)
            .map(|((oper, product), mode)| hash_if(oper, product, mode, want_tx, hasher))
            .collect();
        replace_column(df, &call.result_column, result)
    }
}

/// For products `2` and `3` an 11-character operation code carries the
/// transaction mode in its last two characters. `want_tx` returns the mode,
/// otherwise the integer-normalized code is hashed. Other products yield an
/// empty mode or the code unchanged.
pub fn hash_if(
    oper: &str,
    product: &str,
    mode: &str,
    want_tx: bool,
    hasher: &dyn ValueHasher,
) -> String {
    if product != "2" && product != "3" {
        return if want_tx { String::new() } else { oper.to_owned() };
    }

    let (code, mode) = if oper.chars().count() == 11 {
        let split = oper.char_indices().nth(9).map_or(oper.len(), |(idx, _)| idx);
        oper.split_at(split)
    } else {
        (oper, mode)
    };

    if want_tx {
        mode.to_owned()
    } else {
        hasher.digest(&integer_text(code).unwrap_or_else(|| code.trim().to_owned()))
    }
}

/// Canonical integer text (`"007"` → `"7"`), or `None` for non-integers.
pub fn integer_text(value: &str) -> Option<String> {
    value.trim().parse::<i128>().ok().map(|n| n.to_string())
}

fn skip_hash_traza_doc(value: &str, hasher: &dyn ValueHasher) -> String {
    match value {
        "         " | "000000000" => value.to_owned(),
        other => hasher.digest(other),
    }
}

fn skip_hash_vale(value: &str, hasher: &dyn ValueHasher) -> String {
    match value {
        "9999999" | "999999999999" => value.to_owned(),
        other => hasher.digest(other),
    }
}

fn delete_cero(value: &str, _hasher: &dyn ValueHasher) -> String {
    integer_text(value).unwrap_or_else(|| NOT_AN_INTEGER.to_owned())
}

fn delete_any(value: &str, _hasher: &dyn ValueHasher) -> String {
    let mut chars = value.chars();
    chars.next_back();
    chars.as_str().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::frame_from_rows;
    use crate::pipeline::hasher::Sha256Hasher;

    /// Makes digests easy to read in assertions.
    struct TagHasher;

    impl ValueHasher for TagHasher {
        fn digest(&self, value: &str) -> String {
            format!("h({value})")
        }
    }

    fn frame(columns: &[&str], rows: &[&[&str]]) -> DataFrame {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_owned()).collect();
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(|cell| (*cell).to_owned()).collect())
            .collect();
        frame_from_rows(&columns, &rows).unwrap()
    }

    #[test]
    fn test_parse_call() {
        let call = FunctionCall::parse(" delete-cero : amount : amount_clean ").unwrap();
        assert_eq!(call.name, "delete_cero");
        assert_eq!(call.args, vec!["amount"]);
        assert_eq!(call.result_column, "amount_clean");

        assert!(FunctionCall::parse("lonely").is_err());
        assert!(FunctionCall::parse(":a:b").is_err());
    }

    #[test]
    fn test_registry_lookup_and_check() {
        let registry = FunctionRegistry::builtin();
        assert!(registry.names().contains(&"concat_fields"));
        assert!(registry.get("Delete-Any").is_some());

        let unknown = FunctionCall::parse("to_upper:a:b").unwrap();
        assert!(registry.check(&unknown).unwrap_err().contains("Unknown"));

        let wrong_arity = FunctionCall::parse("hash_if:a:b").unwrap();
        assert!(registry.check(&wrong_arity).unwrap_err().contains("takes 4"));

        let ok = FunctionCall::parse("concat_fields:d:t:dt").unwrap();
        assert!(registry.check(&ok).is_ok());
    }

    #[test]
    fn test_concat_date_time() {
        assert_eq!(concat_date_time("20240115", "1030451234"), "2024-01-15 10:30:45");
        assert_eq!(concat_date_time("2024-01-15", "103045"), "2024-01-15 103045");
        assert_eq!(concat_date_time("20240115", "99"), "20240115 99");
    }

    #[test]
    fn test_hash_if() {
        let h = &TagHasher;
        assert_eq!(hash_if("00012345607", "2", "XX", true, h), "07");
        assert_eq!(hash_if("00012345607", "3", "XX", false, h), "h(123456)");
        assert_eq!(hash_if("0042", "2", "XX", true, h), "XX");
        assert_eq!(hash_if("0042", "2", "XX", false, h), "h(42)");
        assert_eq!(hash_if("0042", "1", "XX", true, h), "");
        assert_eq!(hash_if("0042", "1", "XX", false, h), "0042");
        assert_eq!(hash_if("AB", "2", "", false, h), "h(AB)");
    }

    #[test]
    fn test_skip_hash_sentinels() {
        let h = &TagHasher;
        assert_eq!(skip_hash_traza_doc("         ", h), "         ");
        assert_eq!(skip_hash_traza_doc("000000000", h), "000000000");
        assert_eq!(skip_hash_traza_doc("123", h), "h(123)");
        assert_eq!(skip_hash_vale("9999999", h), "9999999");
        assert_eq!(skip_hash_vale("999999999999", h), "999999999999");
        assert_eq!(skip_hash_vale("5", h), "h(5)");
    }

    #[test]
    fn test_delete_cero_and_delete_any() {
        let h = &TagHasher;
        assert_eq!(delete_cero("000123", h), "123");
        assert_eq!(delete_cero("-007", h), "-7");
        assert_eq!(delete_cero("12a", h), NOT_AN_INTEGER);
        assert_eq!(delete_cero("", h), NOT_AN_INTEGER);
        assert_eq!(delete_any("abc", h), "ab");
        assert_eq!(delete_any("ção", h), "ça");
        assert_eq!(delete_any("", h), "");
    }

    #[test]
    fn test_apply_writes_result_column() {
        let registry = FunctionRegistry::builtin();
        let mut df = frame(&["d", "t"], &[&["20240115", "103045"], &["bad", "x"]]);
        let call = FunctionCall::parse("concat_fields:d:t:dt").unwrap();

        registry
            .get(&call.name)
            .unwrap()
            .apply(&mut df, &call, &Sha256Hasher)
            .unwrap();

        assert_eq!(
            column_values(&df, "dt").unwrap(),
            vec!["2024-01-15 10:30:45", "bad x"]
        );
    }

    #[test]
    fn test_missing_source_column_fails() {
        let registry = FunctionRegistry::builtin();
        let mut df = frame(&["a"], &[&["1"]]);
        let call = FunctionCall::parse("delete_cero:missing:out").unwrap();

        let err = registry
            .get(&call.name)
            .unwrap()
            .apply(&mut df, &call, &Sha256Hasher)
            .unwrap_err();
        assert_eq!(err.kind(), "TransformError");
        assert!(err.to_string().contains("missing"));
    }
}
