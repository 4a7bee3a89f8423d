use std::collections::VecDeque;

use crate::uri::segment::{InclusionPart, Segment, SegmentKind};

/// Verdict of the path-inclusion oracle: does every URI matched by the
/// other pattern also match this one?
///
/// `Indeterminate` means the oracle could not decide; it must never be
/// treated as a disjointness proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternInclusion {
    Included,
    Disjoint,
    Indeterminate,
}

use PatternInclusion::*;

pub(crate) fn includes(left: &[Segment], right: &[Segment]) -> PatternInclusion {
    let left = normalize(left);
    let right = normalize(right);
    walk(&left, &right)
}

/// Canonicalize a segment list: collapse runs of `**` and pull `**` before
/// adjacent pure-wildcard segments. Required for termination and
/// correctness of the per-segment compare.
fn normalize(segments: &[Segment]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        if segment.is_directories() {
            let mut ins = out.len();
            while ins > 0 && out[ins - 1].kind() == SegmentKind::Wildcard {
                ins -= 1;
            }
            if ins > 0 && out[ins - 1].is_directories() {
                continue;
            }
            out.insert(ins, segment.clone());
        } else {
            out.push(segment.clone());
        }
    }
    out
}

fn walk(left: &[Segment], right: &[Segment]) -> PatternInclusion {
    let mut i = 0;
    let mut j = 0;
    loop {
        if i >= left.len() && j >= right.len() {
            return Included;
        }
        if i < left.len() && left[i].is_directories() {
            return walk_directories(&left[i + 1..], &right[j..]);
        }
        if i >= left.len() {
            // the other side still requires segments
            let rest = &right[j..];
            return if rest.iter().all(|s| {
                matches!(
                    s.kind(),
                    SegmentKind::Directories | SegmentKind::Wildcard | SegmentKind::Custom
                )
            }) {
                Indeterminate
            } else {
                Disjoint
            };
        }
        if j >= right.len() {
            let rest = &left[i..];
            return if rest.iter().all(|s| s.is_directories()) {
                Included
            } else if rest.iter().all(|s| {
                matches!(
                    s.kind(),
                    SegmentKind::Directories | SegmentKind::Wildcard | SegmentKind::Custom
                )
            }) {
                Indeterminate
            } else {
                Disjoint
            };
        }
        if right[j].is_directories() {
            // the other side generalizes here; inclusion cannot be proven
            // and disjointness is not proven either
            return Indeterminate;
        }
        match compare_segments(&left[i], &right[j]) {
            Included => {
                i += 1;
                j += 1;
            }
            verdict => return verdict,
        }
    }
}

/// Handle a `**` on the self side: search the exit sequence (the leading
/// run of plain segments after the `**`) inside the other side's
/// remainder, recurse on every candidate split point and aggregate.
fn walk_directories(left_rest: &[Segment], right: &[Segment]) -> PatternInclusion {
    if left_rest.is_empty() {
        // trailing '**' absorbs any remainder
        return Included;
    }
    let exit_len = left_rest
        .iter()
        .take_while(|s| !s.is_directories() && s.kind() != SegmentKind::Custom)
        .count();
    if exit_len == 0 {
        // '**' chained straight into a custom segment cannot be anchored
        return Indeterminate;
    }
    let exit = &left_rest[..exit_len];
    let after = &left_rest[exit_len..];

    let mut verdicts: Vec<PatternInclusion> = Vec::new();
    let mut p = 0;
    while p <= right.len() {
        if p < right.len() && right[p].is_directories() {
            // the other '**' region is absorbed by ours; re-examine the
            // remainder against our own remainder
            verdicts.push(walk(left_rest, &right[p + 1..]));
            p += 1;
            continue;
        }
        if p + exit_len > right.len() {
            break;
        }
        let window = &right[p..p + exit_len];
        let mut verdict = Included;
        for (exit_segment, window_segment) in exit.iter().zip(window) {
            if window_segment.is_directories() {
                verdict = Indeterminate;
                break;
            }
            match compare_segments(exit_segment, window_segment) {
                Included => {}
                other => {
                    verdict = other;
                    break;
                }
            }
        }
        match verdict {
            Included => verdicts.push(walk(after, &right[p + exit_len..])),
            Indeterminate => verdicts.push(Indeterminate),
            Disjoint => {}
        }
        p += 1;
    }

    if verdicts.is_empty() {
        return Disjoint;
    }
    if verdicts.contains(&Indeterminate) {
        return Indeterminate;
    }
    if verdicts.contains(&Included) {
        return Included;
    }
    Disjoint
}

/// Part-wise compare of two non-directories segments.
fn compare_segments(left: &Segment, right: &Segment) -> PatternInclusion {
    let mut a: VecDeque<InclusionPart> = left.inclusion_parts().into();
    let mut b: VecDeque<InclusionPart> = right.inclusion_parts().into();
    loop {
        match (a.front().cloned(), b.front().cloned()) {
            (None, None) => return Included,
            (None, Some(_)) => {
                return if b.iter().any(|p| {
                    matches!(p, InclusionPart::Static(_) | InclusionPart::Any)
                }) {
                    Disjoint
                } else {
                    Indeterminate
                };
            }
            (Some(_), None) => {
                return if a.iter().all(|p| matches!(p, InclusionPart::Wild)) {
                    Included
                } else if a.iter().any(|p| {
                    matches!(p, InclusionPart::Static(_) | InclusionPart::Any)
                }) {
                    Disjoint
                } else {
                    Indeterminate
                };
            }
            (Some(InclusionPart::Static(s)), Some(InclusionPart::Static(t))) => {
                if s == t {
                    a.pop_front();
                    b.pop_front();
                } else if let Some(rest) = t.strip_prefix(s.as_str()) {
                    let rest = rest.to_string();
                    a.pop_front();
                    b.pop_front();
                    b.push_front(InclusionPart::Static(rest));
                } else if let Some(rest) = s.strip_prefix(t.as_str()) {
                    let rest = rest.to_string();
                    b.pop_front();
                    a.pop_front();
                    a.push_front(InclusionPart::Static(rest));
                } else {
                    return Disjoint;
                }
            }
            (Some(InclusionPart::Static(s)), Some(InclusionPart::Any)) => {
                b.pop_front();
                consume_one_char(&mut a, &s);
            }
            (Some(InclusionPart::Any), Some(InclusionPart::Static(t))) => {
                a.pop_front();
                consume_one_char(&mut b, &t);
            }
            (Some(InclusionPart::Any), Some(InclusionPart::Any)) => {
                a.pop_front();
                b.pop_front();
            }
            (Some(InclusionPart::Custom(p)), Some(InclusionPart::Custom(q))) => {
                if p == q {
                    a.pop_front();
                    b.pop_front();
                } else {
                    return Indeterminate;
                }
            }
            (Some(InclusionPart::Custom(_)), _) | (_, Some(InclusionPart::Custom(_))) => {
                return Indeterminate;
            }
            (Some(InclusionPart::Wild), _) | (_, Some(InclusionPart::Wild)) => {
                return compare_wildcard(a, b);
            }
        }
    }
}

fn consume_one_char(parts: &mut VecDeque<InclusionPart>, current: &str) {
    let mut chars = current.chars();
    chars.next();
    let rest: String = chars.collect();
    parts.pop_front();
    if !rest.is_empty() {
        parts.push_front(InclusionPart::Static(rest));
    }
}

/// Minimum matched length and, when bounded, maximum matched length of a
/// part run. Custom parts are treated as unbounded.
fn min_max(parts: &VecDeque<InclusionPart>) -> (usize, Option<usize>) {
    let mut min = 0;
    let mut bounded = true;
    for part in parts {
        match part {
            InclusionPart::Static(s) => min += s.chars().count(),
            InclusionPart::Any => min += 1,
            InclusionPart::Wild | InclusionPart::Custom(_) => bounded = false,
        }
    }
    (min, if bounded { Some(min) } else { None })
}

/// Compare once a `*` leads on either side: skip the `*`/`?` chains on
/// both sides and decide on what remains.
fn compare_wildcard(
    mut a: VecDeque<InclusionPart>,
    mut b: VecDeque<InclusionPart>,
) -> PatternInclusion {
    let mut a_wild = false;
    let mut a_any = 0usize;
    let mut b_wild = false;
    let mut b_any = 0usize;
    loop {
        match a.front() {
            Some(InclusionPart::Wild) => {
                a_wild = true;
                a.pop_front();
            }
            Some(InclusionPart::Any) => {
                a_any += 1;
                a.pop_front();
            }
            _ => break,
        }
    }
    loop {
        match b.front() {
            Some(InclusionPart::Wild) => {
                b_wild = true;
                b.pop_front();
            }
            Some(InclusionPart::Any) => {
                b_any += 1;
                b.pop_front();
            }
            _ => break,
        }
    }

    match (a.front().cloned(), b.front().cloned()) {
        (None, None) => {
            if a_wild {
                if b_any >= a_any {
                    Included
                } else if b_wild {
                    Indeterminate
                } else {
                    Disjoint
                }
            } else if b_wild {
                if b_any <= a_any {
                    Indeterminate
                } else {
                    Disjoint
                }
            } else if a_any == b_any {
                Included
            } else {
                Disjoint
            }
        }
        (None, Some(_)) => {
            let (rest_min, rest_max) = min_max(&b);
            let b_min = b_any + rest_min;
            let b_max = if b_wild { None } else { rest_max.map(|m| b_any + m) };
            if a_wild {
                if b_min >= a_any {
                    Included
                } else if let Some(max) = b_max {
                    if max < a_any {
                        Disjoint
                    } else {
                        Indeterminate
                    }
                } else {
                    Indeterminate
                }
            } else {
                // the self side matches any content of one exact length
                match b_max {
                    Some(max) if max == b_min && b_min == a_any => Included,
                    Some(max) if max < a_any => Disjoint,
                    _ if b_min > a_any => Disjoint,
                    _ => Indeterminate,
                }
            }
        }
        (Some(_), None) => {
            // the self side demands specific content the other side does
            // not guarantee; at best the two overlap
            let (rest_min, rest_max) = min_max(&a);
            let a_min = a_any + rest_min;
            let a_max = if a_wild { None } else { rest_max.map(|m| a_any + m) };
            let overlaps = if b_wild {
                match a_max {
                    Some(max) => max >= b_any,
                    None => true,
                }
            } else {
                a_min <= b_any && a_max.map_or(true, |max| max >= b_any)
            };
            if overlaps {
                Indeterminate
            } else {
                Disjoint
            }
        }
        (Some(InclusionPart::Static(s)), Some(InclusionPart::Static(t)))
            if a.len() == 1 && b.len() == 1 =>
        {
            if a_wild {
                if t.ends_with(s.as_str()) {
                    let t_prefix = t.chars().count() - s.chars().count();
                    if b_any + t_prefix >= a_any {
                        return Included;
                    }
                    return if b_wild { Indeterminate } else { Disjoint };
                }
                if s.ends_with(t.as_str()) {
                    // the other side can still produce strings we match
                    return Indeterminate;
                }
                Disjoint
            } else {
                // self is an exact string (with a fixed '?' prefix)
                let s_prefix = s.chars().count().checked_sub(t.chars().count());
                let in_other = match s_prefix {
                    Some(prefix) if s.ends_with(t.as_str()) => {
                        let total = a_any + prefix;
                        if b_wild {
                            total >= b_any
                        } else {
                            total == b_any
                        }
                    }
                    _ => false,
                };
                if in_other {
                    Indeterminate
                } else {
                    Disjoint
                }
            }
        }
        _ => Indeterminate,
    }
}

#[cfg(test)]
mod tests {
    use super::PatternInclusion;
    use crate::uri::{UriBuilder, UriOptions, UriPattern};

    fn pattern(path: &str) -> UriPattern {
        let mut builder = UriBuilder::new(UriOptions::new().path_pattern());
        builder.path(path, false).unwrap();
        builder.build_pattern(false).unwrap()
    }

    fn includes(left: &str, right: &str) -> PatternInclusion {
        pattern(left).includes(&pattern(right))
    }

    #[test]
    fn test_directories_inclusion() {
        assert_eq!(includes("/a/**/c", "/a/b/c"), PatternInclusion::Included);
        assert_eq!(includes("/a/**/c", "/a/c"), PatternInclusion::Included);
        assert_eq!(
            includes("/a/**/c", "/a/b/b/c"),
            PatternInclusion::Included
        );
        assert_eq!(includes("/a/**/c", "/a/b/d"), PatternInclusion::Disjoint);
    }

    #[test]
    fn test_wildcard_is_not_directories() {
        assert_eq!(includes("/a/*", "/a/b/c"), PatternInclusion::Disjoint);
        assert_eq!(includes("/a/*", "/a/b"), PatternInclusion::Included);
    }

    #[test]
    fn test_custom_pattern_is_indeterminate() {
        assert_eq!(
            includes("/a/{x:[0-9]+}", "/a/b"),
            PatternInclusion::Indeterminate
        );
        assert_eq!(
            includes("/a/{x:[0-9]+}", "/a/{y:[0-9]+}"),
            PatternInclusion::Included
        );
    }

    #[test]
    fn test_trailing_directories_absorbs() {
        assert_eq!(includes("/a/**", "/a"), PatternInclusion::Included);
        assert_eq!(includes("/a/**", "/a/b/c/d"), PatternInclusion::Included);
        assert_eq!(includes("/a/**", "/a/**/b"), PatternInclusion::Included);
        assert_eq!(includes("/a/**", "/b"), PatternInclusion::Disjoint);
    }

    #[test]
    fn test_directories_on_both_sides() {
        assert_eq!(includes("/a/**/c", "/a/**/c"), PatternInclusion::Included);
        assert_eq!(
            includes("/a/**/c", "/a/**/b/c"),
            PatternInclusion::Included
        );
    }

    #[test]
    fn test_directories_on_other_side_only() {
        assert_eq!(includes("/a/b", "/a/**"), PatternInclusion::Indeterminate);
    }

    #[test]
    fn test_static_compare() {
        assert_eq!(includes("/a/b", "/a/b"), PatternInclusion::Included);
        assert_eq!(includes("/a/b", "/a/c"), PatternInclusion::Disjoint);
        assert_eq!(includes("/a", "/a/b"), PatternInclusion::Disjoint);
        assert_eq!(includes("/a/b", "/a"), PatternInclusion::Disjoint);
    }

    #[test]
    fn test_question_mark_compare() {
        assert_eq!(includes("/a/b?", "/a/bc"), PatternInclusion::Included);
        assert_eq!(includes("/a/b?", "/a/b"), PatternInclusion::Disjoint);
        assert_eq!(includes("/a/???", "/a/abc"), PatternInclusion::Included);
    }

    #[test]
    fn test_wildcard_suffix_compare() {
        assert_eq!(includes("/a/*.png", "/a/b.png"), PatternInclusion::Included);
        assert_eq!(
            includes("/a/*.png", "/a/*.x.png"),
            PatternInclusion::Included
        );
        assert_eq!(includes("/a/*.png", "/a/b.jpg"), PatternInclusion::Disjoint);
    }

    #[test]
    fn test_normalization_collapses_directories_runs() {
        assert_eq!(includes("/a/**/*", "/a/*/**"), PatternInclusion::Included);
        assert_eq!(includes("/a/*/**", "/a/**/*"), PatternInclusion::Included);
    }

    #[test]
    fn test_inclusion_is_not_symmetric() {
        assert_eq!(includes("/a/**/c", "/a/x/c"), PatternInclusion::Included);
        assert_eq!(
            includes("/a/x/c", "/a/**/c"),
            PatternInclusion::Indeterminate
        );
    }

    #[test]
    fn test_monotonicity_sample() {
        // p1 ⊇ p2 and p2 ⊇ p3 implies p1.includes(p3) is not DISJOINT
        let p1 = "/a/**";
        let p2 = "/a/**/c";
        let p3 = "/a/b/c";
        assert_eq!(includes(p1, p2), PatternInclusion::Included);
        assert_eq!(includes(p2, p3), PatternInclusion::Included);
        assert_ne!(includes(p1, p3), PatternInclusion::Disjoint);
    }

    #[test]
    fn test_non_path_pattern_is_indeterminate() {
        let mut builder = UriBuilder::new(UriOptions::new().parameterized());
        builder.path("/a/{x}", false).unwrap();
        let plain = builder.build_pattern(false).unwrap();
        assert_eq!(
            plain.includes(&plain),
            PatternInclusion::Indeterminate
        );
    }
}
