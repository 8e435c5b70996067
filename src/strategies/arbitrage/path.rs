//! Pool graph and cycle enumeration
//!
//! 풀을 토큰 기준으로 인덱싱한 뒤, 각 베이스 토큰에서 출발해 다시 돌아오는 순환을
//! 깊이 제한 DFS로 찾습니다. 순환 안에서 토큰은 재방문하지 않고 풀도 재사용하지
//! 않습니다. 홉 수에 따라 cross-dex(2), triangular(3), complex(4+)로 분류됩니다.

use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

use crate::config::StrategyConfig;
use crate::constants::CANCEL_POLL_INTERVAL;
use crate::dex::LiquidityPool;
use crate::types::{ArbitragePath, PathKind};

/// DEX 허용 목록과 유동성으로 필터링된 풀 그래프
#[derive(Debug, Clone, Default)]
pub struct PoolGraph {
    pools: Vec<LiquidityPool>,
    by_token: HashMap<String, Vec<usize>>,
}

impl PoolGraph {
    pub fn build(pools: impl IntoIterator<Item = LiquidityPool>, config: &StrategyConfig) -> Self {
        Self::from_pools(pools.into_iter().filter(|pool| config.allows_dex(pool.dex)))
    }

    pub fn from_pools(pools: impl IntoIterator<Item = LiquidityPool>) -> Self {
        let mut pools: Vec<LiquidityPool> = pools.into_iter().filter(|p| p.has_liquidity()).collect();
        // HashMap 순회 순서와 무관하게 결정적인 탐색 순서
        pools.sort_by(|a, b| a.address.cmp(&b.address));

        let mut by_token: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, pool) in pools.iter().enumerate() {
            by_token.entry(pool.token_a.clone()).or_default().push(idx);
            by_token.entry(pool.token_b.clone()).or_default().push(idx);
        }

        Self { pools, by_token }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn pools(&self) -> &[LiquidityPool] {
        &self.pools
    }

    pub fn tokens(&self) -> Vec<String> {
        let tokens: BTreeSet<&String> = self.by_token.keys().collect();
        tokens.into_iter().cloned().collect()
    }

    fn pools_for(&self, token: &str) -> &[usize] {
        self.by_token.get(token).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathSearch {
    pub paths: Vec<ArbitragePath>,
    pub candidates_visited: usize,
    pub cancelled: bool,
}

impl PathSearch {
    pub fn count(&self, kind: PathKind) -> usize {
        self.paths.iter().filter(|p| p.kind == kind).count()
    }
}

struct Finder<'a> {
    graph: &'a PoolGraph,
    max_hops: usize,
    cancel: &'a CancellationToken,
    search: PathSearch,
    tokens: Vec<String>,
    pools: Vec<usize>,
}

impl<'a> Finder<'a> {
    /// 후보 하나를 셀 때마다 호출. 취소되면 false
    fn tick(&mut self) -> bool {
        self.search.candidates_visited += 1;
        if self.search.candidates_visited % CANCEL_POLL_INTERVAL == 0 && self.cancel.is_cancelled() {
            self.search.cancelled = true;
        }
        !self.search.cancelled
    }

    fn dfs(&mut self, base: &str, current: &str) {
        let graph = self.graph;
        for &pool_idx in graph.pools_for(current) {
            if !self.tick() {
                return;
            }
            if self.pools.contains(&pool_idx) {
                continue;
            }
            let pool = &graph.pools[pool_idx];
            let next = match pool.other_token(current) {
                Some(token) => token.to_string(),
                None => continue,
            };

            if next == base {
                if self.pools.len() + 1 >= 2 {
                    self.emit(base, pool_idx);
                }
                continue;
            }

            if self.pools.len() + 1 >= self.max_hops || self.tokens.contains(&next) {
                continue;
            }

            self.tokens.push(next.clone());
            self.pools.push(pool_idx);
            self.dfs(base, &next);
            self.pools.pop();
            self.tokens.pop();

            if self.search.cancelled {
                return;
            }
        }
    }

    fn emit(&mut self, base: &str, closing_pool: usize) {
        let mut tokens = self.tokens.clone();
        tokens.push(base.to_string());
        let pools: Vec<LiquidityPool> = self
            .pools
            .iter()
            .chain(std::iter::once(&closing_pool))
            .map(|&idx| self.graph.pools[idx].clone())
            .collect();

        let kind = match pools.len() {
            2 => PathKind::CrossDex,
            3 => PathKind::Triangular,
            _ => PathKind::Complex,
        };
        self.search.paths.push(ArbitragePath::new(kind, tokens, pools));
    }
}

/// 베이스 토큰마다 닫힌 순환을 찾습니다. `max_hops`는 사용 가능한 풀 수의 상한
pub fn enumerate_paths(
    graph: &PoolGraph,
    base_tokens: &[String],
    max_hops: usize,
    cancel: &CancellationToken,
) -> PathSearch {
    let mut finder = Finder {
        graph,
        max_hops,
        cancel,
        search: PathSearch::default(),
        tokens: Vec::new(),
        pools: Vec::new(),
    };

    if max_hops < 2 {
        return finder.search;
    }

    for base in base_tokens {
        if cancel.is_cancelled() {
            finder.search.cancelled = true;
            break;
        }
        finder.tokens = vec![base.clone()];
        finder.pools.clear();
        finder.dfs(base, base);
        if finder.search.cancelled {
            break;
        }
    }

    finder.search
}
