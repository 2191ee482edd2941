//! Built-in tools: shell execution, file access, and search.

mod bash;
mod glob;
mod grep;
mod read_file;
mod write_file;

pub use bash::BashTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

use std::sync::Arc;

use crate::registry::ToolRegistry;

/// Register every built-in tool into `registry`.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(Arc::new(BashTool::default()));
    registry.register(Arc::new(ReadFileTool));
    registry.register(Arc::new(WriteFileTool));
    registry.register(Arc::new(GrepTool));
    registry.register(Arc::new(GlobTool));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_builtins() {
        let mut reg = ToolRegistry::new();
        register_builtins(&mut reg);
        assert_eq!(
            reg.names(),
            vec!["bash", "glob", "grep", "read_file", "write_file"]
        );
    }
}
