use rusqlite::types::{ToSql, ToSqlOutput, Value};

/// A positional SQL parameter produced by the filter compiler. Keeps the
/// compiler free of driver types so clause lowering is testable without a
/// database.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Real(f64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            Self::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
        })
    }
}

/// A compiled lead query: one WHERE fragment (tenant clause included) and
/// its positional parameters, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub where_sql: String,
    pub params: Vec<SqlParam>,
}

impl CompiledQuery {
    pub fn param_refs(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p as &dyn ToSql).collect()
    }
}
