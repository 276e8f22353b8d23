use std::str::FromStr;

use crate::{
    database::postgres::generate::quote_identifier,
    schema::{Column, TableSchema},
};

#[derive(thiserror::Error, Debug)]
#[error("Conflict policy only accepts 'overwrite' or 'ignore', got '{0}'")]
pub struct PolicyError(pub String);

/// How rows matching an existing unique-index value are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Rewrite every non-key column of the existing row with the incoming
    /// value. Rows whose incoming values are all identical to the existing
    /// row are skipped, so bookkeeping columns and triggers are not touched.
    Overwrite,
    /// Leave existing rows untouched and drop the incoming duplicates.
    Ignore,
}

impl FromStr for MergePolicy {
    type Err = PolicyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            // 'update' is the historical spelling of overwrite
            "overwrite" | "update" => Ok(MergePolicy::Overwrite),
            "ignore" => Ok(MergePolicy::Ignore),
            other => Err(PolicyError(other.to_string())),
        }
    }
}

/// Synthesizes the set-based insert-from-select statement that reconciles
/// scratch rows into the target table.
///
/// The insert list and the select list are rendered from the same ordered
/// column slice, so they cannot disagree. Duplicate detection is whatever
/// unique indexes the target table declares: a target with no unique column
/// makes either policy degenerate to an unconditional insert, which is
/// expected behavior, not an error.
pub fn build_merge_sql(
    target: &TableSchema,
    scratch_name: &str,
    mergeable_columns: &[&Column],
    policy: MergePolicy,
) -> String {
    let column_list = mergeable_columns
        .iter()
        .map(|column| quote_identifier(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let target_name = quote_identifier(&target.name);

    let mut sql = format!(
        "INSERT INTO {} ({})\nSELECT {}\nFROM {}",
        target_name,
        column_list,
        column_list,
        quote_identifier(scratch_name)
    );

    match policy {
        MergePolicy::Ignore => {
            sql.push_str("\nON CONFLICT DO NOTHING");
        }
        MergePolicy::Overwrite => {
            let conflict_columns = target.unique_columns();
            if conflict_columns.is_empty() {
                return sql;
            }

            let conflict_list = conflict_columns
                .iter()
                .map(|column| quote_identifier(&column.name))
                .collect::<Vec<_>>()
                .join(", ");
            let set_clauses = mergeable_columns
                .iter()
                .map(|column| {
                    let name = quote_identifier(&column.name);
                    format!("{} = EXCLUDED.{}", name, name)
                })
                .collect::<Vec<_>>()
                .join(", ");

            // Skip rows whose incoming values match the existing row, which
            // keeps the affected-row count at zero for identical rows
            let current_row = mergeable_columns
                .iter()
                .map(|column| format!("{}.{}", target_name, quote_identifier(&column.name)))
                .collect::<Vec<_>>()
                .join(", ");
            let incoming_row = mergeable_columns
                .iter()
                .map(|column| format!("EXCLUDED.{}", quote_identifier(&column.name)))
                .collect::<Vec<_>>()
                .join(", ");

            sql.push_str(&format!(
                "\nON CONFLICT ({})\nDO UPDATE SET {}\nWHERE ({}) IS DISTINCT FROM ({})",
                conflict_list, set_clauses, current_row, incoming_row
            ));
        }
    }

    sql
}
