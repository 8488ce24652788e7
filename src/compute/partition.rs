//! Splits an in-memory row set into buckets keyed by line id.

use csv::StringRecord;
use tracing::debug;

use super::datagram;

/// Rows assigned to one worker.
#[derive(Debug, Clone, Default)]
pub struct DatagramPartition {
    id: usize,
    rows: Vec<StringRecord>,
}

impl DatagramPartition {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            rows: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn push(&mut self, row: StringRecord) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Assigns rows to `line_id mod n` (floored). Rows whose line id is missing
/// or unreadable go to bucket 0, so bucket 0 is not a uniform sample.
#[derive(Debug, Clone, Copy)]
pub struct PartitionManager {
    partitions: usize,
}

impl PartitionManager {
    /// `partitions` is clamped to at least one bucket.
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn bucket_for(&self, row: &StringRecord) -> usize {
        match datagram::line_id(row) {
            Ok(line_id) => i64::from(line_id).rem_euclid(self.partitions as i64) as usize,
            Err(_) => 0,
        }
    }

    pub fn create_partitions(&self, rows: Vec<StringRecord>) -> Vec<DatagramPartition> {
        let mut parts: Vec<DatagramPartition> =
            (0..self.partitions).map(DatagramPartition::new).collect();

        for row in rows {
            let bucket = self.bucket_for(&row);
            parts[bucket].push(row);
        }

        for p in &parts {
            debug!(partition = p.id(), rows = p.len(), "Partition filled");
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::datagram::tests::row;

    #[test]
    fn test_rows_are_keyed_by_line_modulo() {
        let pm = PartitionManager::new(4);
        let rows = vec![
            row("B1", "131", "2019-05-29 10:00:00", 3.4, -76.5),
            row("B2", "4", "2019-05-29 10:00:00", 3.4, -76.5),
            row("B3", "6", "2019-05-29 10:00:00", 3.4, -76.5),
        ];
        let parts = pm.create_partitions(rows);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[3].len(), 1); // 131 % 4
        assert_eq!(parts[0].len(), 1); // 4 % 4
        assert_eq!(parts[2].len(), 1); // 6 % 4
    }

    #[test]
    fn test_negative_line_id_uses_floored_modulo() {
        let pm = PartitionManager::new(4);
        let r = row("B1", "-3", "2019-05-29 10:00:00", 3.4, -76.5);
        assert_eq!(pm.bucket_for(&r), 1);
    }

    #[test]
    fn test_malformed_rows_land_in_bucket_zero() {
        let pm = PartitionManager::new(3);
        let rows = vec![
            StringRecord::from(vec!["only", "three", "fields"]),
            row("B1", "not-a-number", "2019-05-29 10:00:00", 3.4, -76.5),
            row("B2", "", "2019-05-29 10:00:00", 3.4, -76.5),
            row("B3", "5", "2019-05-29 10:00:00", 3.4, -76.5),
        ];
        let parts = pm.create_partitions(rows);

        assert_eq!(parts[0].len(), 3);
        assert_eq!(parts[2].len(), 1);
    }

    #[test]
    fn test_no_row_is_dropped() {
        let pm = PartitionManager::new(5);
        let rows: Vec<_> = (0..97)
            .map(|i| {
                let line = if i % 7 == 0 { "?".to_string() } else { i.to_string() };
                row("B", &line, "2019-05-29 10:00:00", 3.4, -76.5)
            })
            .collect();
        let total = rows.len();
        let parts = pm.create_partitions(rows);

        assert_eq!(parts.iter().map(DatagramPartition::len).sum::<usize>(), total);
    }

    #[test]
    fn test_zero_partitions_clamps_to_one() {
        let pm = PartitionManager::new(0);
        assert_eq!(pm.partitions(), 1);
    }
}
