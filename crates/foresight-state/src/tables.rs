//! redb table definitions for the evaluation store.

use redb::TableDefinition;

/// Evaluations keyed by `{target}:{model}:{id:020}`, JSON values.
pub const EVALUATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("evaluations");

/// Next evaluation ID keyed by `{target}:{model}`.
pub const NEXT_IDS: TableDefinition<&str, u64> = TableDefinition::new("next_ids");
