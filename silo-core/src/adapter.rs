use crate::{Column, DatabaseError, Dialect, Formatters, Result, RowLabeled};

/// The fixed capability set every adapter reports. The keys are the same
/// for every engine, only the values differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub arrays: bool,
    pub transactions: bool,
    pub savepoints: bool,
    pub booleans: bool,
    pub server_default: bool,
}

impl Features {
    pub fn enabled(&self, feature: &str) -> Option<bool> {
        Some(match feature {
            "arrays" => self.arrays,
            "transactions" => self.transactions,
            "savepoints" => self.savepoints,
            "booleans" => self.booleans,
            "server_default" => self.server_default,
            _ => return None,
        })
    }
}

/// One engine behind a `Connection`.
///
/// Implementations translate native failures into `DatabaseError`
/// carrying the native code when the driver reports one, and override
/// `install_formatters` for the conversions their engine spells
/// differently.
pub trait Adapter: Send {
    fn name(&self) -> &'static str;

    fn features(&self) -> Features;

    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement which returns no rows, yielding the affected-row
    /// count.
    fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a statement and collect its result rows.
    fn query(&mut self, sql: &str) -> Result<Vec<RowLabeled>>;

    /// The id generated by the last insert. `sequence` carries the
    /// `{source}_{key}_seq` name for engines that need one.
    fn last_insert_id(&mut self, sequence: Option<&str>) -> Result<Option<i64>>;

    /// The table names of the connected database.
    fn sources(&mut self) -> Result<Vec<String>>;

    /// Introspect one table into portable column descriptions.
    fn fields(&mut self, source: &str) -> Result<Vec<Column>>;

    fn encoding(&mut self) -> Result<String> {
        Err(DatabaseError::new("Encoding is not supported by this driver."))
    }

    fn set_encoding(&mut self, _encoding: &str) -> Result<()> {
        Err(DatabaseError::new("Encoding is not supported by this driver."))
    }

    /// Override the registry entries the engine spells differently.
    /// Called once by `Connection::new` after the defaults are loaded.
    fn install_formatters(&self, _formatters: &mut Formatters) {}

    fn connected(&self) -> bool;

    fn disconnect(&mut self) -> Result<()>;
}
