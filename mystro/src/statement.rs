/// Server assigned handle of a prepared statement.
///
/// Statement ids are scoped to the connection that prepared them.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StatementHandle {
    id: u32,
    params: u16,
    columns: u16,
}

impl StatementHandle {
    pub(crate) const fn new(id: u32, params: u16, columns: u16) -> Self {
        Self { id, params, columns }
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Number of `?` placeholders the statement expects.
    pub const fn params(&self) -> u16 {
        self.params
    }

    /// Number of columns in the statement's result set.
    pub const fn columns(&self) -> u16 {
        self.columns
    }
}

impl std::fmt::Debug for StatementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("StatementHandle").field(&self.id).finish()
    }
}
