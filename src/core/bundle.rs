use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Opportunity, Transaction};

/// 하나의 기회를 실현하는 동결된 트랜잭션 묶음
///
/// `BundleBuilder::build()`로만 생성되며 읽기 접근자만 노출합니다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    id: String,
    opportunity_id: String,
    strategy_name: String,
    transactions: Vec<Transaction>,
    target_block: u64,
    timeout_ms: u64,
    expected_profit_eth: f64,
    gas_estimate: u64,
    created_at: DateTime<Utc>,
}

impl Bundle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn opportunity_id(&self) -> &str {
        &self.opportunity_id
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn target_block(&self) -> u64 {
        self.target_block
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn expected_profit_eth(&self) -> f64 {
        self.expected_profit_eth
    }

    pub fn gas_estimate(&self) -> u64 {
        self.gas_estimate
    }

    /// 트랜잭션 gas_limit 합계
    pub fn total_gas_limit(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.gas_limit).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Append-only bundle builder
#[derive(Debug)]
pub struct BundleBuilder {
    opportunity_id: String,
    strategy_name: String,
    transactions: Vec<Transaction>,
    target_block: u64,
    timeout_ms: u64,
    expected_profit_eth: f64,
    gas_estimate: u64,
}

impl BundleBuilder {
    /// 검증된 기회에서 시작. 타깃 블록은 기회가 관측된 다음 블록
    pub fn for_opportunity(opportunity: &Opportunity, timeout_ms: u64) -> Self {
        Self {
            opportunity_id: opportunity.id.clone(),
            strategy_name: opportunity.strategy_name.clone(),
            transactions: Vec::new(),
            target_block: opportunity.block_number + 1,
            timeout_ms,
            expected_profit_eth: opportunity.net_profit_eth,
            gas_estimate: opportunity.gas_limit,
        }
    }

    pub fn push(mut self, tx: Transaction) -> Self {
        self.transactions.push(tx);
        self
    }

    pub fn extend(mut self, txs: impl IntoIterator<Item = Transaction>) -> Self {
        self.transactions.extend(txs);
        self
    }

    pub fn next_nonce(&self) -> u64 {
        self.transactions.len() as u64
    }

    pub fn build(self) -> Bundle {
        Bundle {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_id: self.opportunity_id,
            strategy_name: self.strategy_name,
            transactions: self.transactions,
            target_block: self.target_block,
            timeout_ms: self.timeout_ms,
            expected_profit_eth: self.expected_profit_eth,
            gas_estimate: self.gas_estimate,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{DexKind, LiquidityPool};
    use crate::types::OpportunityDetails;

    #[test]
    fn test_builder_targets_next_block() {
        let pool = LiquidityPool::new("0x01", "A", "B", DexKind::UniswapV2, 100.0, 100.0, 0.3).unwrap();
        let opp = Opportunity::new("arbitrage", 100, OpportunityDetails::Generic { description: "x".into() })
            .with_profit(0.2, 0.05)
            .with_gas(250_000, 10.0);

        let builder = BundleBuilder::for_opportunity(&opp, 1_000);
        let tx = Transaction::swap(&pool, "A", "B", 1.0, 0.9, 110_000, 10.0, builder.next_nonce());
        let bundle = builder.push(tx).build();

        assert_eq!(bundle.target_block(), 101);
        assert_eq!(bundle.timeout_ms(), 1_000);
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.total_gas_limit(), 110_000);
        assert_eq!(bundle.opportunity_id(), opp.id);
        assert!((bundle.expected_profit_eth() - 0.15).abs() < 1e-12);
    }
}
