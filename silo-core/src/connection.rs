use crate::{
    Adapter, Column, Cursor, Dialect, Features, Formatters, Result, Schema, TransactionError,
    Value,
};

/// Options of `Connection::query_with`.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// When false a failing statement yields an errored cursor instead of
    /// an `Err`, which lets callers check for capabilities.
    pub exception: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { exception: true }
    }
}

/// A live connection: one adapter, the conversion registry configured for
/// it, and the transaction nesting state.
pub struct Connection {
    adapter: Box<dyn Adapter>,
    formatters: Formatters,
    transaction_level: u32,
}

impl Connection {
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        let mut formatters = Formatters::defaults();
        adapter.install_formatters(&mut formatters);
        Self {
            adapter,
            formatters,
            transaction_level: 0,
        }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.adapter.dialect()
    }

    pub fn features(&self) -> Features {
        self.adapter.features()
    }

    pub fn formatters(&self) -> &Formatters {
        &self.formatters
    }

    pub fn formatters_mut(&mut self) -> &mut Formatters {
        &mut self.formatters
    }

    /// Run a statement and return a cursor over its rows.
    pub fn query(&mut self, sql: &str) -> Result<Cursor> {
        self.query_with(sql, QueryOptions::default())
    }

    pub fn query_with(&mut self, sql: &str, options: QueryOptions) -> Result<Cursor> {
        log::debug!("query: {}", sql);
        match self.adapter.query(sql) {
            Ok(rows) => Ok(Cursor::data(rows)),
            Err(error) => {
                let error = error.for_sql(sql);
                if options.exception {
                    log::error!("{}", error);
                    Err(error)
                } else {
                    Ok(Cursor::failed(error))
                }
            }
        }
    }

    /// Run a statement which returns no rows, yielding the affected-row
    /// count.
    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        log::debug!("execute: {}", sql);
        self.adapter.execute(sql).map_err(|error| {
            let error = error.for_sql(sql);
            log::error!("{}", error);
            error
        })
    }

    /// Cast a wire value to its application representation for the
    /// portable type `kind`.
    pub fn cast(&self, kind: &str, value: &Value, column: Option<&Column>) -> Result<Value> {
        self.formatters.cast(kind, value, column)
    }

    /// Render an application value as an SQL literal for the portable
    /// type `kind`.
    pub fn format(&self, kind: &str, value: &Value, column: Option<&Column>) -> Result<String> {
        self.formatters
            .format(kind, value, column, self.adapter.dialect())
    }

    /// Open a transaction, or a savepoint when one is already open and
    /// the engine supports them.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction_level == 0 {
            let sql = self.dialect().begin_sql().to_owned();
            self.execute(&sql)?;
        } else if self.features().savepoints {
            let sql = self.dialect().savepoint_sql(self.transaction_level + 1);
            self.execute(&sql)?;
        }
        self.transaction_level += 1;
        Ok(())
    }

    /// Commit the innermost unit. Only the outermost commit reaches the
    /// engine; inner ones just unwind a level.
    pub fn commit(&mut self) -> Result<()> {
        if self.transaction_level == 0 {
            return Ok(());
        }
        if self.transaction_level == 1 {
            let sql = self.dialect().commit_sql().to_owned();
            self.execute(&sql)?;
        }
        self.transaction_level -= 1;
        Ok(())
    }

    /// Roll back the innermost unit.
    pub fn rollback(&mut self) -> Result<()> {
        if self.transaction_level == 0 {
            return Ok(());
        }
        self.rollback_to(self.transaction_level - 1)
    }

    /// Roll back to nesting level `to`. Rolling back to a level at or
    /// above the current one is a no-op.
    pub fn rollback_to(&mut self, to: u32) -> Result<()> {
        if to >= self.transaction_level {
            return Ok(());
        }
        if to == 0 {
            let sql = self.dialect().rollback_sql().to_owned();
            self.execute(&sql)?;
        } else if self.features().savepoints {
            let sql = self.dialect().rollback_to_sql(to + 1);
            self.execute(&sql)?;
        }
        self.transaction_level = to;
        Ok(())
    }

    pub fn transaction_level(&self) -> u32 {
        self.transaction_level
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_level > 0
    }

    /// Run `work` inside a transaction, retrying up to `max_retries`
    /// times on failure. A deadlock aborts immediately: the engine
    /// already discarded the transaction, so the level is unwound and
    /// the error propagated without consuming a retry.
    pub fn transaction<T, F>(&mut self, max_retries: u32, mut work: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> std::result::Result<T, TransactionError>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.begin_transaction()?;
            match work(self) {
                Ok(value) => {
                    self.commit()?;
                    return Ok(value);
                }
                Err(TransactionError::Deadlock(error)) => {
                    self.transaction_level = self.transaction_level.saturating_sub(1);
                    return Err(error);
                }
                Err(TransactionError::Failed(error)) => {
                    self.rollback()?;
                    if attempts > max_retries {
                        return Err(error);
                    }
                    log::warn!("retrying transaction after: {}", error);
                }
            }
        }
    }

    pub fn last_insert_id(&mut self, sequence: Option<&str>) -> Result<Option<i64>> {
        self.adapter.last_insert_id(sequence)
    }

    pub fn sources(&mut self) -> Result<Vec<String>> {
        self.adapter.sources()
    }

    /// Introspect a table into a schema bound to it.
    pub fn describe(&mut self, source: &str) -> Result<Schema> {
        let columns = self.adapter.fields(source)?;
        let mut schema = Schema::new().source(source);
        for column in columns {
            schema = schema.column(column);
        }
        Ok(schema)
    }

    pub fn encoding(&mut self) -> Result<String> {
        self.adapter.encoding()
    }

    pub fn set_encoding(&mut self, encoding: &str) -> Result<()> {
        self.adapter.set_encoding(encoding)
    }

    pub fn connected(&self) -> bool {
        self.adapter.connected()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.adapter.disconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatabaseError, GenericSqlDialect, RowLabeled};
    use std::sync::{Arc, Mutex};

    struct Mock {
        executed: Arc<Mutex<Vec<String>>>,
        savepoints: bool,
        dialect: GenericSqlDialect,
    }

    impl Mock {
        fn connection(savepoints: bool) -> (Connection, Arc<Mutex<Vec<String>>>) {
            let executed = Arc::new(Mutex::new(Vec::new()));
            let adapter = Mock {
                executed: executed.clone(),
                savepoints,
                dialect: GenericSqlDialect,
            };
            (Connection::new(Box::new(adapter)), executed)
        }
    }

    impl Adapter for Mock {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn features(&self) -> Features {
            Features {
                arrays: false,
                transactions: true,
                savepoints: self.savepoints,
                booleans: true,
                server_default: false,
            }
        }

        fn dialect(&self) -> &dyn Dialect {
            &self.dialect
        }

        fn execute(&mut self, sql: &str) -> Result<u64> {
            self.executed.lock().unwrap().push(sql.to_owned());
            Ok(0)
        }

        fn query(&mut self, sql: &str) -> Result<Vec<RowLabeled>> {
            self.executed.lock().unwrap().push(sql.to_owned());
            Ok(Vec::new())
        }

        fn last_insert_id(&mut self, _sequence: Option<&str>) -> Result<Option<i64>> {
            Ok(None)
        }

        fn sources(&mut self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn fields(&mut self, _source: &str) -> Result<Vec<Column>> {
            Ok(Vec::new())
        }

        fn connected(&self) -> bool {
            true
        }

        fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn nested_transactions_use_savepoints() {
        let (mut connection, executed) = Mock::connection(true);
        connection.begin_transaction().unwrap();
        connection.begin_transaction().unwrap();
        connection.begin_transaction().unwrap();
        assert_eq!(connection.transaction_level(), 3);
        connection.commit().unwrap();
        connection.commit().unwrap();
        connection.commit().unwrap();
        assert_eq!(connection.transaction_level(), 0);
        assert_eq!(
            *executed.lock().unwrap(),
            ["BEGIN", "SAVEPOINT TRANS2", "SAVEPOINT TRANS3", "COMMIT"]
        );
    }

    #[test]
    fn nesting_without_savepoint_support_is_silent() {
        let (mut connection, executed) = Mock::connection(false);
        connection.begin_transaction().unwrap();
        connection.begin_transaction().unwrap();
        connection.rollback().unwrap();
        assert_eq!(connection.transaction_level(), 1);
        connection.commit().unwrap();
        assert_eq!(*executed.lock().unwrap(), ["BEGIN", "COMMIT"]);
    }

    #[test]
    fn rollback_to_unwinds_to_the_requested_level() {
        let (mut connection, executed) = Mock::connection(true);
        connection.begin_transaction().unwrap();
        connection.begin_transaction().unwrap();
        connection.begin_transaction().unwrap();
        connection.rollback_to(1).unwrap();
        assert_eq!(connection.transaction_level(), 1);
        // unwinding above the current level does nothing
        connection.rollback_to(5).unwrap();
        assert_eq!(connection.transaction_level(), 1);
        connection.rollback().unwrap();
        assert_eq!(connection.transaction_level(), 0);
        assert_eq!(
            *executed.lock().unwrap(),
            [
                "BEGIN",
                "SAVEPOINT TRANS2",
                "SAVEPOINT TRANS3",
                "ROLLBACK TO SAVEPOINT TRANS2",
                "ROLLBACK"
            ]
        );
    }

    #[test]
    fn rollback_outside_a_transaction_is_a_no_op() {
        let (mut connection, executed) = Mock::connection(true);
        connection.rollback().unwrap();
        connection.commit().unwrap();
        assert!(executed.lock().unwrap().is_empty());
    }

    #[test]
    fn transaction_retries_until_success() {
        let (mut connection, executed) = Mock::connection(true);
        let mut failures = 2;
        let result = connection.transaction(3, |_| {
            if failures > 0 {
                failures -= 1;
                return Err(DatabaseError::new("serialization failure").into());
            }
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(
            *executed.lock().unwrap(),
            ["BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK", "BEGIN", "COMMIT"]
        );
    }

    #[test]
    fn transaction_exhausts_retries() {
        let (mut connection, _) = Mock::connection(true);
        let result: Result<()> = connection.transaction(1, |_| {
            Err(DatabaseError::new("constraint violation").into())
        });
        assert_eq!(result.unwrap_err().message, "constraint violation");
        assert_eq!(connection.transaction_level(), 0);
    }

    #[test]
    fn deadlock_aborts_without_retrying() {
        let (mut connection, executed) = Mock::connection(true);
        let mut calls = 0;
        let result: Result<()> = connection.transaction(5, |_| {
            calls += 1;
            Err(DatabaseError::new("deadlock detected").into())
        });
        assert!(result.unwrap_err().is_deadlock());
        assert_eq!(calls, 1);
        assert_eq!(connection.transaction_level(), 0);
        // the engine already discarded the transaction, no ROLLBACK sent
        assert_eq!(*executed.lock().unwrap(), ["BEGIN"]);
    }
}
