//! Small reproducible subsets of an ML-ready table, for trying the service out.
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::error::InputError;
use super::table::Table;

const SEED: u64 = 42;
const SMALL: usize = 100;
const MEDIUM: usize = 1000;
const BALANCED_CAP: usize = 500;

/// Picks `amount` distinct rows (or every row if there are fewer), keeping table order.
pub fn sample_rows(table: &Table, amount: usize, rng: &mut StdRng) -> Table {
    let amount = amount.min(table.len());
    let mut picked = index::sample(rng, table.len(), amount).into_vec();
    picked.sort_unstable();

    let mut sample = Table::new(table.columns().to_vec());
    for i in picked {
        sample.push_row(table.rows()[i].clone());
    }
    sample
}

/// Same number of rows for every label: the rarest label's count, capped at 500.
///
/// Returns `None` when the table has no `label` column.
pub fn balanced_sample(table: &Table, rng: &mut StdRng) -> Option<Table> {
    let label_index = table.column_index("label")?;

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        let label = row[label_index].to_string();
        groups
            .entry(label.clone())
            .or_insert_with(|| {
                order.push(label);
                Vec::new()
            })
            .push(i);
    }

    let per_label = groups.values().map(Vec::len).min().unwrap_or(0).min(BALANCED_CAP);

    let mut sample = Table::new(table.columns().to_vec());
    for label in &order {
        let members = &groups[label];
        let mut picked = index::sample(rng, members.len(), per_label).into_vec();
        picked.sort_unstable();
        for i in picked {
            sample.push_row(table.rows()[members[i]].clone());
        }
    }
    Some(sample)
}

/// Writes `sample_small_100.csv`, `sample_medium_1000.csv` and, when labels exist,
/// `sample_balanced.csv` into `output_dir`. Returns the written paths.
pub fn create_sample_datasets(table: &Table, output_dir: &Path) -> Result<Vec<(PathBuf, usize)>, InputError> {
    let mut written = Vec::new();

    let mut rng = StdRng::seed_from_u64(SEED);
    let small = sample_rows(table, SMALL, &mut rng);
    let path = output_dir.join("sample_small_100.csv");
    small.write_csv(&path)?;
    written.push((path, small.len()));

    let mut rng = StdRng::seed_from_u64(SEED);
    let medium = sample_rows(table, MEDIUM, &mut rng);
    let path = output_dir.join("sample_medium_1000.csv");
    medium.write_csv(&path)?;
    written.push((path, medium.len()));

    let mut rng = StdRng::seed_from_u64(SEED);
    if let Some(balanced) = balanced_sample(table, &mut rng) {
        let path = output_dir.join("sample_balanced.csv");
        balanced.write_csv(&path)?;
        written.push((path, balanced.len()));
    }

    Ok(written)
}
