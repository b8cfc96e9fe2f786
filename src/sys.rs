//! Access to the interpreter's `sys` module

use crate::error::Result;
use crate::list::List;
use crate::utilities::import_module;
use tracing::debug;

/// Append `entry` to `sys.path` so later imports can find modules there
pub fn add_to_path(entry: &str) -> Result<()> {
    let mut search = path()?;
    search.append(&entry.to_string())?;
    debug!(event = "sys_path_append", path = entry);
    Ok(())
}

/// Current module search path
pub fn path() -> Result<List<String>> {
    let sys = import_module("sys")?;
    List::try_from(sys.getattr("path")?)
}
