use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::CoreError;

/// A bound value for an equality predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Uuid(Uuid),
    Text(String),
    Int(i64),
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(&'static str, SqlValue),
    IsNull(&'static str),
}

/// `select(table, filters)` over one table, always scoped to a realm.
///
/// Table and column names are `'static` so only values are ever bound from
/// caller input.
#[derive(Debug, Clone)]
pub struct Select {
    table: &'static str,
    realm_id: Uuid,
    predicates: Vec<Predicate>,
    order: Vec<(&'static str, Direction)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Select {
    pub fn scoped(table: &'static str, realm_id: Uuid) -> Self {
        Self {
            table,
            realm_id,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.predicates.push(Predicate::Eq(column, value.into()));
        self
    }

    pub fn is_null(mut self, column: &'static str) -> Self {
        self.predicates.push(Predicate::IsNull(column));
        self
    }

    /// Adds an ordering term. `expr` may be a column or a fixed SQL expression.
    pub fn order_by(mut self, expr: &'static str, direction: Direction) -> Self {
        self.order.push((expr, direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn push_where<'a>(&self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE realm_id = ");
        qb.push_bind(self.realm_id);
        for predicate in &self.predicates {
            match predicate {
                Predicate::Eq(column, value) => {
                    qb.push(" AND ");
                    qb.push(*column);
                    qb.push(" = ");
                    match value {
                        SqlValue::Uuid(v) => qb.push_bind(*v),
                        SqlValue::Text(v) => qb.push_bind(v.clone()),
                        SqlValue::Int(v) => qb.push_bind(*v),
                    };
                }
                Predicate::IsNull(column) => {
                    qb.push(" AND ");
                    qb.push(*column);
                    qb.push(" IS NULL");
                }
            }
        }
    }

    pub fn build<'a>(&self) -> QueryBuilder<'a, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT * FROM ");
        qb.push(self.table);
        self.push_where(&mut qb);

        if !self.order.is_empty() {
            qb.push(" ORDER BY ");
            for (i, (expr, direction)) in self.order.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(*expr);
                qb.push(" ");
                qb.push(direction.as_sql());
            }
        }
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
            if let Some(offset) = self.offset {
                qb.push(" OFFSET ");
                qb.push_bind(offset);
            }
        }
        qb
    }

    pub fn build_count<'a>(&self) -> QueryBuilder<'a, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM ");
        qb.push(self.table);
        self.push_where(&mut qb);
        qb
    }

    pub async fn fetch_all<T>(&self, pool: &DbPool) -> Result<Vec<T>, CoreError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut qb = self.build();
        let rows = qb.build_query_as::<T>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn fetch_optional<T>(&self, pool: &DbPool) -> Result<Option<T>, CoreError>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut qb = self.build();
        let row = qb.build_query_as::<T>().fetch_optional(pool).await?;
        Ok(row)
    }

    pub async fn count(&self, pool: &DbPool) -> Result<i64, CoreError> {
        let mut qb = self.build_count();
        let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_always_realm_scoped() {
        let qb = Select::scoped("tasks", Uuid::now_v7()).build();
        assert_eq!(qb.sql(), "SELECT * FROM tasks WHERE realm_id = ?");
    }

    #[test]
    fn test_select_with_filters_and_paging() {
        let qb = Select::scoped("milestones", Uuid::now_v7())
            .eq("subtask_id", Uuid::now_v7())
            .is_null("sub_subtask_id")
            .order_by("milestone_date", Direction::Asc)
            .order_by("created_at", Direction::Desc)
            .limit(10)
            .offset(20)
            .build();
        assert_eq!(
            qb.sql(),
            "SELECT * FROM milestones WHERE realm_id = ? AND subtask_id = ? AND sub_subtask_id IS NULL \
             ORDER BY milestone_date ASC, created_at DESC LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn test_count_ignores_ordering() {
        let qb = Select::scoped("temp_tasks", Uuid::now_v7())
            .eq("status", "completed")
            .order_by("name", Direction::Asc)
            .build_count();
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM temp_tasks WHERE realm_id = ? AND status = ?");
    }
}
