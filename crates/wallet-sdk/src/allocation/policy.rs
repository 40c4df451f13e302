use super::ChangeInput;

/// Pick the candidate a change allocator should claim.
///
/// 1. any candidate worth exactly `exact_satoshis`, when given
/// 2. the smallest candidate worth at least `target_satoshis`
/// 3. the largest candidate worth less than `target_satoshis`
///
/// Ties go to the lowest output id so the choice does not depend on how the
/// pool happens to be ordered.
pub fn select_candidate<'a, I>(
    candidates: I,
    target_satoshis: u64,
    exact_satoshis: Option<u64>,
) -> Option<ChangeInput>
where
    I: IntoIterator<Item = &'a ChangeInput>,
{
    let mut exact: Option<ChangeInput> = None;
    let mut covering: Option<ChangeInput> = None;
    let mut below: Option<ChangeInput> = None;

    for c in candidates {
        if exact_satoshis == Some(c.satoshis)
            && exact.is_none_or(|best| c.output_id < best.output_id)
        {
            exact = Some(*c);
        }

        if c.satoshis >= target_satoshis {
            let better = covering.is_none_or(|best| {
                (c.satoshis, c.output_id) < (best.satoshis, best.output_id)
            });
            if better {
                covering = Some(*c);
            }
        } else {
            let better = below.is_none_or(|best| {
                c.satoshis > best.satoshis
                    || (c.satoshis == best.satoshis && c.output_id < best.output_id)
            });
            if better {
                below = Some(*c);
            }
        }
    }

    exact.or(covering).or(below)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(values: &[(i64, u64)]) -> Vec<ChangeInput> {
        values
            .iter()
            .map(|&(output_id, satoshis)| ChangeInput {
                output_id,
                satoshis,
            })
            .collect()
    }

    #[test]
    fn exact_match_wins_over_smallest_sufficient() {
        let p = pool(&[(1, 5000), (2, 4715), (3, 10_000)]);
        let got = select_candidate(&p, 4715, Some(4715)).unwrap();
        assert_eq!(got.output_id, 2);
    }

    #[test]
    fn exact_is_ignored_when_not_requested() {
        let p = pool(&[(1, 6000), (2, 4715)]);
        let got = select_candidate(&p, 4000, None).unwrap();
        assert_eq!(got.output_id, 2);
    }

    #[test]
    fn missing_exact_falls_back_to_smallest_sufficient() {
        let p = pool(&[(1, 16_151), (2, 6323), (3, 1000)]);
        let got = select_candidate(&p, 4715, Some(4715)).unwrap();
        assert_eq!(got.output_id, 2);
    }

    #[test]
    fn largest_below_target_when_nothing_covers() {
        let p = pool(&[(1, 1000), (2, 1041), (3, 1004)]);
        let got = select_candidate(&p, 10_000, None).unwrap();
        assert_eq!(got.output_id, 2);
    }

    #[test]
    fn ties_break_on_lowest_id() {
        let p = pool(&[(9, 1000), (4, 1000), (7, 1000)]);
        assert_eq!(select_candidate(&p, 500, None).unwrap().output_id, 4);
        assert_eq!(select_candidate(&p, 5000, None).unwrap().output_id, 4);
        assert_eq!(select_candidate(&p, 0, Some(1000)).unwrap().output_id, 4);
    }

    #[test]
    fn target_equal_to_candidate_counts_as_covering() {
        let p = pool(&[(1, 999), (2, 1000), (3, 1001)]);
        assert_eq!(select_candidate(&p, 1000, None).unwrap().output_id, 2);
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let empty: Vec<ChangeInput> = Vec::new();
        assert!(select_candidate(&empty, 1, Some(1)).is_none());
    }
}
