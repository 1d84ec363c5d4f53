use crate::{DatabaseError, Result, RowLabeled};

/// Forward iterator over a statement result or an in-memory sequence.
///
/// A cursor born from a server statement holds that statement's rows
/// exclusively and refuses to rewind; a data cursor may be rewound. An
/// errored cursor (built when execution was silenced with
/// `exception: false`) yields nothing and exposes the translated error.
#[derive(Debug)]
pub struct Cursor {
    rows: Vec<RowLabeled>,
    position: usize,
    started: bool,
    closed: bool,
    resource: bool,
    error: Option<DatabaseError>,
}

impl Cursor {
    /// Cursor over rows produced by an executed statement.
    pub fn resource(rows: Vec<RowLabeled>) -> Self {
        Self {
            rows,
            position: 0,
            started: false,
            closed: false,
            resource: true,
            error: None,
        }
    }

    /// Cursor over an in-memory sequence.
    pub fn data(rows: Vec<RowLabeled>) -> Self {
        Self {
            resource: false,
            ..Self::resource(rows)
        }
    }

    /// Cursor flagging a failed execution instead of raising.
    pub fn failed(error: DatabaseError) -> Self {
        Self {
            error: Some(error),
            ..Self::resource(Vec::new())
        }
    }

    pub fn failed_execution(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&DatabaseError> {
        self.error.as_ref()
    }

    /// The last row yielded by `next`, if any.
    pub fn current(&self) -> Option<&RowLabeled> {
        if !self.started || self.closed {
            return None;
        }
        // position stays 0 when iteration started on an empty set
        self.position
            .checked_sub(1)
            .and_then(|index| self.rows.get(index))
    }

    /// Rewind to the first position. Server-backed cursors fail fast once
    /// iteration has started rather than silently re-executing.
    pub fn rewind(&mut self) -> Result<()> {
        if self.resource && self.started {
            return Err(DatabaseError::new(
                "A statement resource doesn't support the rewind operation.",
            ));
        }
        self.position = 0;
        self.started = false;
        Ok(())
    }

    /// Release the underlying rows; the cursor yields nothing afterwards.
    pub fn close(&mut self) {
        self.rows.clear();
        self.closed = true;
    }
}

impl Iterator for Cursor {
    type Item = RowLabeled;

    fn next(&mut self) -> Option<RowLabeled> {
        if self.closed || self.error.is_some() {
            return None;
        }
        self.started = true;
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }
}
