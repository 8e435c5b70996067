use crate::types::ArbitragePath;

/// 경로를 따라 입력을 흘려 보낸 홉별 출력. 토큰/풀 구조가 맞지 않으면 None
pub fn simulate_path(path: &ArbitragePath, input: f64) -> Option<Vec<f64>> {
    let hops = path.hops()?;
    let mut amount = input;
    let mut outputs = Vec::with_capacity(hops.len());
    for (pool, a_to_b) in hops {
        amount = pool.swap_output(amount, a_to_b);
        outputs.push(amount);
    }
    Some(outputs)
}

pub fn path_output(path: &ArbitragePath, input: f64) -> f64 {
    simulate_path(path, input)
        .and_then(|outputs| outputs.last().copied())
        .unwrap_or(0.0)
}

/// 시작 토큰 단위의 수익 (출력 - 입력)
pub fn path_profit(path: &ArbitragePath, input: f64) -> f64 {
    path_output(path, input) - input
}

/// 첫 홉의 입력측 리저브
pub fn liquidity_bound(path: &ArbitragePath) -> f64 {
    path.hops()
        .and_then(|hops| hops.first().map(|(pool, a_to_b)| pool.reserves_for(*a_to_b).0))
        .unwrap_or(0.0)
}

/// [0, bound] 구간 삼분 탐색으로 수익 최대 입력 탐색
///
/// 상수곱 풀의 합성은 입력에 대해 오목하므로 수익 함수는 단봉입니다.
/// 반환값: (입력, 수익). 수익이 0 이하이면 (0, 0).
pub fn find_optimal_input(path: &ArbitragePath, iterations: usize) -> (f64, f64) {
    let bound = liquidity_bound(path);
    if bound <= 0.0 {
        return (0.0, 0.0);
    }

    let mut lo = 0.0;
    let mut hi = bound;
    for _ in 0..iterations {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        if path_profit(path, m1) < path_profit(path, m2) {
            lo = m1;
        } else {
            hi = m2;
        }
    }

    let input = (lo + hi) / 2.0;
    let profit = path_profit(path, input);
    if profit > 0.0 {
        (input, profit)
    } else {
        (0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TERNARY_SEARCH_ITERATIONS;
    use crate::dex::{DexKind, LiquidityPool};
    use crate::types::PathKind;

    fn triangle(ca: (f64, f64)) -> ArbitragePath {
        let pools = vec![
            LiquidityPool::new("0xab", "A", "B", DexKind::UniswapV2, 1000.0, 1000.0, 0.3).unwrap(),
            LiquidityPool::new("0xbc", "B", "C", DexKind::UniswapV2, 500.0, 2000.0, 0.3).unwrap(),
            LiquidityPool::new("0xca", "C", "A", DexKind::UniswapV2, ca.0, ca.1, 0.3).unwrap(),
        ];
        let tokens = ["A", "B", "C", "A"].iter().map(|t| t.to_string()).collect();
        ArbitragePath::new(PathKind::Triangular, tokens, pools)
    }

    /// 경로 전체를 x -> A x / (B + C x) 하나로 합성
    fn composite(path: &ArbitragePath) -> (f64, f64, f64) {
        let mut first = true;
        let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
        for (pool, a_to_b) in path.hops().unwrap() {
            let gamma = 1.0 - pool.fee_percent / 100.0;
            let (r_in, r_out) = pool.reserves_for(a_to_b);
            if first {
                a = gamma * r_out;
                b = r_in;
                c = gamma;
                first = false;
            } else {
                let prev_a = a;
                a = gamma * r_out * prev_a;
                c = r_in * c + gamma * prev_a;
                b *= r_in;
            }
        }
        (a, b, c)
    }

    #[test]
    fn test_scenario_ten_unit_profit_matches_composition() {
        let path = triangle((2000.0, 500.0));
        let h1 = 10.0 * 0.997 * 1000.0 / (1000.0 + 10.0 * 0.997);
        let h2 = h1 * 0.997 * 2000.0 / (500.0 + h1 * 0.997);
        let h3 = h2 * 0.997 * 500.0 / (2000.0 + h2 * 0.997);

        let outputs = simulate_path(&path, 10.0).unwrap();
        assert!((outputs[0] - h1).abs() < 1e-9);
        assert!((outputs[1] - h2).abs() < 1e-9);
        assert!((outputs[2] - h3).abs() < 1e-9);
        assert!((path_profit(&path, 10.0) - (h3 - 10.0)).abs() < 1e-9);
        assert!((path_output(&path, 10.0) - 9.4413).abs() < 1e-3);

        let (a, b, c) = composite(&path);
        assert!((a * 10.0 / (b + c * 10.0) - h3).abs() < 1e-9);
    }

    #[test]
    fn test_balanced_cycle_has_no_profitable_input() {
        let path = triangle((2000.0, 500.0));
        assert_eq!(find_optimal_input(&path, TERNARY_SEARCH_ITERATIONS), (0.0, 0.0));
    }

    #[test]
    fn test_optimal_input_matches_closed_form() {
        let path = triangle((2000.0, 600.0));
        let bound = liquidity_bound(&path);
        assert_eq!(bound, 1000.0);

        let (input, profit) = find_optimal_input(&path, TERNARY_SEARCH_ITERATIONS);
        assert!(input > 0.0 && input < bound);
        assert!(profit > 0.0);

        let (a, b, c) = composite(&path);
        let closed_form = ((a * b).sqrt() - b) / c;
        assert!((input - closed_form).abs() < 1e-4 * closed_form);

        // 최대점 주변보다 수익이 작지 않음
        assert!(profit >= path_profit(&path, input * 0.9));
        assert!(profit >= path_profit(&path, input * 1.1));
    }

    #[test]
    fn test_broken_path_simulates_to_none() {
        let mut path = triangle((2000.0, 500.0));
        path.tokens[1] = "Z".to_string();
        assert!(simulate_path(&path, 1.0).is_none());
        assert_eq!(path_output(&path, 1.0), 0.0);
    }
}
