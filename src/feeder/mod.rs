pub mod csv_feeder;

pub use csv_feeder::{DataFeeder, DataRow, DataSource};

use crate::Result;
use std::sync::Arc;

/// 场景的全部数据源
///
/// 每次迭代从每个数据源各取一行并合并，后声明的数据源覆盖同名列。
#[derive(Debug, Clone, Default)]
pub struct FeederSet {
    feeders: Vec<Arc<DataFeeder>>,
}

impl FeederSet {
    pub fn new(feeders: Vec<Arc<DataFeeder>>) -> Self {
        Self { feeders }
    }

    /// 打开所有数据源，任一失败即返回错误
    pub fn open_all(sources: &[DataSource]) -> Result<Self> {
        let feeders = sources
            .iter()
            .map(|source| DataFeeder::open(source).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { feeders })
    }

    /// 从每个数据源各取一行
    ///
    /// 先检查全部数据源，任一已耗尽时直接返回错误，不推进其它数据源的游标。
    pub fn next_rows(&self) -> Result<DataRow> {
        if let Some(exhausted) = self.feeders.iter().find(|f| f.is_exhausted()) {
            exhausted.next()?;
        }

        let mut merged = DataRow::new();
        for feeder in &self.feeders {
            merged.merge(feeder.next()?);
        }
        Ok(merged)
    }

    pub fn len(&self) -> usize {
        self.feeders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_rows_merges_sources() {
        let products = DataFeeder::from_reader(
            "product_id,price\nthe_odyssey,99.99\n".as_bytes(),
            &DataSource::new("products.csv"),
        )
        .unwrap();
        let users = DataFeeder::from_reader(
            "user,price\nalice,5.99\n".as_bytes(),
            &DataSource::new("users.csv"),
        )
        .unwrap();

        let set = FeederSet::new(vec![Arc::new(products), Arc::new(users)]);
        let row = set.next_rows().unwrap();
        assert_eq!(row.get("product_id"), Some("the_odyssey"));
        assert_eq!(row.get("user"), Some("alice"));
        assert_eq!(row.get("price"), Some("5.99"));
    }

    #[test]
    fn test_exhausted_source_keeps_other_cursors() {
        let products = Arc::new(
            DataFeeder::from_reader(
                "product_id\nthe_odyssey\nthe_iliad\nthe_aeneid\n".as_bytes(),
                &DataSource::new("products.csv"),
            )
            .unwrap(),
        );
        let users = Arc::new(
            DataFeeder::from_reader(
                "user\nalice\n".as_bytes(),
                &DataSource::new("users.csv").with_cycle(false),
            )
            .unwrap(),
        );

        let set = FeederSet::new(vec![products.clone(), users.clone()]);
        assert_eq!(set.next_rows().unwrap().get("product_id"), Some("the_odyssey"));
        assert!(users.is_exhausted());

        assert!(matches!(
            set.next_rows(),
            Err(crate::RuloadError::DataExhausted(_))
        ));
        assert!(set.next_rows().is_err());
        assert_eq!(products.next().unwrap().get("product_id"), Some("the_iliad"));
    }

    #[test]
    fn test_empty_set_yields_empty_rows() {
        let set = FeederSet::default();
        assert!(set.is_empty());
        assert!(set.next_rows().unwrap().is_empty());
    }
}
