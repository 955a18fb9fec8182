// Paginated Query Execution
// Builds count and page queries for a single table, runs them with bound
// parameters and renders every cell as text.

use crate::db::handle::{DriverConnection, Statement};
use crate::db::identifier::{is_valid_identifier, qualified_table, quote};
use crate::db::types::{CellValue, DataRow, DatabaseError, QueryResult};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::Write;
use tiberius::{ColumnData, FromSql, ToSql};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// 1-based page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Rows skipped before this page. Fails when the offset does not fit in an `i64`.
    pub fn offset(&self) -> Result<i64, DatabaseError> {
        self.page
            .checked_sub(1)
            .and_then(|skipped| skipped.checked_mul(self.page_size))
            .ok_or(DatabaseError::InvalidPage)
    }

    /// Pages needed for `total_rows`, rounding up
    pub fn total_pages(&self, total_rows: i64) -> i64 {
        if self.page_size <= 0 || total_rows <= 0 {
            return 0;
        }
        total_rows / self.page_size + i64::from(total_rows % self.page_size != 0)
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.page < 1 || self.page_size < 1 {
            return Err(DatabaseError::InvalidPage);
        }
        self.offset().map(|_| ())
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Validated SQL for one `select_data` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectPlan {
    pub count_sql: String,
    pub data_sql: String,
    /// `%value%`, bound as `@P1` when a filter applies
    pub filter_pattern: Option<String>,
    pub page: PageRequest,
}

impl SelectPlan {
    /// Validate the object names and build both statements. Nothing is sent
    /// to the server when this fails.
    pub fn build(
        schema: &str,
        table: &str,
        filter_column: &str,
        filter_value: &str,
        page: PageRequest,
    ) -> Result<Self, DatabaseError> {
        if !is_valid_identifier(table) || (!schema.is_empty() && !is_valid_identifier(schema)) {
            return Err(DatabaseError::InvalidObjectName);
        }
        if !filter_column.is_empty() && !is_valid_identifier(filter_column) {
            return Err(DatabaseError::InvalidColumnName);
        }
        page.validate()?;
        let offset = page.offset()?;

        let table_ref = qualified_table(schema, table);
        let (where_clause, filter_pattern) =
            if !filter_column.is_empty() && !filter_value.is_empty() {
                (
                    format!(" WHERE {} LIKE @P1", quote(filter_column)),
                    Some(format!("%{}%", filter_value)),
                )
            } else {
                (String::new(), None)
            };

        let count_sql = format!("SELECT COUNT_BIG(*) FROM {}{}", table_ref, where_clause);
        let data_sql = format!(
            "SELECT * FROM {}{} ORDER BY (SELECT NULL) OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            table_ref,
            where_clause,
            offset,
            page.page_size
        );

        Ok(Self {
            count_sql,
            data_sql,
            filter_pattern,
            page,
        })
    }

    async fn run<'c>(
        &self,
        conn: &'c mut DriverConnection,
        sql: &str,
    ) -> Result<Statement<'c>, DatabaseError> {
        match &self.filter_pattern {
            Some(pattern) => {
                let params: [&dyn ToSql; 1] = [pattern];
                Statement::execute(conn, sql, &params).await
            }
            None => Statement::execute(conn, sql, &[]).await,
        }
    }
}

/// Run a plan: total count first, then the requested page.
pub async fn select_page(
    conn: &mut DriverConnection,
    plan: &SelectPlan,
) -> Result<QueryResult, DatabaseError> {
    let total_rows = {
        let mut stmt = plan.run(conn, &plan.count_sql).await?;
        let row = stmt.fetch().await?;
        match row {
            Some(row) => row.try_get::<i64, _>(0)?.unwrap_or(0),
            None => 0,
        }
    };

    let mut result = QueryResult::new(plan.page.page, plan.page.page_size);
    result.total_rows = total_rows;
    result.total_pages = plan.page.total_pages(total_rows);

    let mut stmt = plan.run(conn, &plan.data_sql).await?;
    result.columns = stmt.column_names().await?;

    while let Some(row) = stmt.fetch().await? {
        let mut data_row: DataRow = Vec::with_capacity(result.columns.len());
        for (name, data) in result.columns.iter().zip(row.into_iter()) {
            data_row.push((name.clone(), render_cell(data)?));
        }
        result.rows.push(data_row);
    }

    debug!(
        total_rows,
        returned = result.rows.len(),
        page = plan.page.page,
        "fetched page"
    );
    result.success = true;
    Ok(result)
}

/// Render one cell as text; NULL of any type becomes `CellValue::Null`.
///
/// Character data arrives already decoded to UTF-8: the driver converts
/// single-byte `varchar`/`char`/`text` using the code page of the column's
/// collation.
pub fn render_cell(data: ColumnData<'static>) -> Result<CellValue, DatabaseError> {
    let text = match &data {
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| v.to_string()),
        ColumnData::F64(v) => v.map(|v| v.to_string()),
        ColumnData::Bit(v) => v.map(|b| if b { "1" } else { "0" }.to_string()),
        ColumnData::Numeric(v) => v.as_ref().map(|n| format_numeric(n.value(), n.scale())),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string().to_uppercase()),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Binary(v) => v.as_ref().map(|b| format_binary(b)),
        ColumnData::Xml(v) => v.as_ref().map(|x| x.clone().into_owned().into_string()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?.map(|d| d.format("%Y-%m-%d").to_string()),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?.map(|t| t.format("%H:%M:%S%.f").to_string()),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(&data)?.map(|dt| dt.to_rfc3339())
        }
        #[allow(unreachable_patterns)]
        _ => None,
    };
    Ok(CellValue::from(text))
}

/// Scaled integer to decimal text, e.g. `(-12345, 2)` -> `-123.45`
pub fn format_numeric(value: i128, scale: u8) -> String {
    if scale == 0 {
        return value.to_string();
    }
    let divisor = 10u128.pow(scale as u32);
    let abs = value.unsigned_abs();
    format!(
        "{}{}.{:0width$}",
        if value < 0 { "-" } else { "" },
        abs / divisor,
        abs % divisor,
        width = scale as usize
    )
}

/// Binary value as `0x` followed by upper-case hex
pub fn format_binary(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out
}
