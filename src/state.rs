// 6.0: owned state aggregate. one clear owner per table, handed by reference
// to the health and liquidation engines. ledgers never call back up into the
// engines; all dependencies point one way.

use crate::funding::PerpLedger;
use crate::insurance::InsuranceFund;
use crate::interest::SpotLedger;
use crate::pool::LpLedger;
use crate::risk::RiskParams;
use crate::types::{HealthGroupId, ProductId, ProductKind, QUOTE_PRODUCT};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub kind: ProductKind,
    pub risk: RiskParams,
}

// 6.1: a health group pairs a spot product and a perp product eligible for
// spread netting. groups are append-only; a netting pair appears at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthGroup {
    pub spot: Option<ProductId>,
    pub perp: Option<ProductId>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    #[error("health group for this netting pair already exists")]
    DuplicatePair,

    #[error("health group must reference at least one product")]
    EmptyGroup,

    #[error("health group {0:?} not found")]
    GroupNotFound(HealthGroupId),
}

#[derive(Debug, Clone, Default)]
pub struct HealthGroups {
    groups: Vec<HealthGroup>,
}

impl HealthGroups {
    pub fn add(&mut self, group: HealthGroup) -> Result<HealthGroupId, GroupError> {
        if group.spot.is_none() && group.perp.is_none() {
            return Err(GroupError::EmptyGroup);
        }
        if self.groups.iter().any(|g| *g == group) {
            return Err(GroupError::DuplicatePair);
        }
        self.groups.push(group);
        Ok(HealthGroupId(self.groups.len() as u32 - 1))
    }

    pub fn get(&self, id: HealthGroupId) -> Result<&HealthGroup, GroupError> {
        self.groups
            .get(id.0 as usize)
            .ok_or(GroupError::GroupNotFound(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (HealthGroupId, &HealthGroup)> {
        self.groups
            .iter()
            .enumerate()
            .map(|(i, g)| (HealthGroupId(i as u32), g))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// 6.2: oracle price registry. the quote product is always worth exactly one.
#[derive(Debug, Clone, Default)]
pub struct OraclePrices {
    prices: HashMap<ProductId, Decimal>,
}

impl OraclePrices {
    pub fn set(&mut self, product: ProductId, price: Decimal) {
        self.prices.insert(product, price);
    }

    pub fn get(&self, product: ProductId) -> Decimal {
        if product == QUOTE_PRODUCT {
            return Decimal::ONE;
        }
        self.prices.get(&product).copied().unwrap_or(Decimal::ZERO)
    }
}

// 6.3: everything the core owns. cloning is the snapshot primitive behind
// atomic operations: mutate a live copy, restore on failure.
#[derive(Debug, Clone, Default)]
pub struct Ledgers {
    pub products: HashMap<ProductId, ProductConfig>,
    pub spot: SpotLedger,
    pub perp: PerpLedger,
    pub pools: LpLedger,
    pub groups: HealthGroups,
    pub insurance: InsuranceFund,
}

impl Ledgers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(&self, product: ProductId) -> Option<&ProductConfig> {
        self.products.get(&product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_append_only_and_indexed() {
        let mut groups = HealthGroups::default();
        let a = groups
            .add(HealthGroup {
                spot: Some(ProductId(1)),
                perp: Some(ProductId(2)),
            })
            .unwrap();
        let b = groups
            .add(HealthGroup {
                spot: Some(ProductId(3)),
                perp: None,
            })
            .unwrap();

        assert_eq!(a, HealthGroupId(0));
        assert_eq!(b, HealthGroupId(1));
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn duplicate_pair_rejected() {
        let mut groups = HealthGroups::default();
        let group = HealthGroup {
            spot: Some(ProductId(1)),
            perp: Some(ProductId(2)),
        };
        groups.add(group).unwrap();
        assert!(matches!(groups.add(group), Err(GroupError::DuplicatePair)));
    }

    #[test]
    fn empty_group_rejected() {
        let mut groups = HealthGroups::default();
        assert!(matches!(
            groups.add(HealthGroup {
                spot: None,
                perp: None
            }),
            Err(GroupError::EmptyGroup)
        ));
    }

    #[test]
    fn quote_product_price_is_one() {
        let prices = OraclePrices::default();
        assert_eq!(prices.get(QUOTE_PRODUCT), Decimal::ONE);
        assert_eq!(prices.get(ProductId(9)), Decimal::ZERO);
    }
}
