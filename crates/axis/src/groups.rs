//! Two-group label encoding.
//!
//! Caller labels are mapped onto the canonical ids `0` and `1`. The axis
//! always points from group 0 towards group 1, so the encoding order is what
//! fixes the sign of every projection.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::AxisError;

/// Number of groups an axis is defined between.
pub const N_GROUPS: usize = 2;

/// A caller-supplied group label: a string or a number.
///
/// Labels order as integers (compared numerically), then floats (IEEE total
/// order), then strings. `Uint` only carries values above `i64::MAX`; the
/// `From` conversions pick it automatically.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupLabel {
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
}

impl GroupLabel {
    fn rank(&self) -> u8 {
        match self {
            GroupLabel::Int(_) | GroupLabel::Uint(_) => 0,
            GroupLabel::Float(_) => 1,
            GroupLabel::Text(_) => 2,
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match self {
            GroupLabel::Int(v) => Some(i128::from(*v)),
            GroupLabel::Uint(v) => Some(i128::from(*v)),
            _ => None,
        }
    }
}

impl Ord for GroupLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupLabel::Float(a), GroupLabel::Float(b)) => a.total_cmp(b),
            (GroupLabel::Text(a), GroupLabel::Text(b)) => a.cmp(b),
            _ => match (self.as_integer(), other.as_integer()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl PartialOrd for GroupLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GroupLabel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupLabel {}

impl Hash for GroupLabel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            GroupLabel::Int(_) | GroupLabel::Uint(_) => self.as_integer().hash(state),
            GroupLabel::Float(v) => v.to_bits().hash(state),
            GroupLabel::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupLabel::Int(v) => write!(f, "{v}"),
            GroupLabel::Uint(v) => write!(f, "{v}"),
            GroupLabel::Float(v) => write!(f, "{v:?}"),
            GroupLabel::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for GroupLabel {
    fn from(value: &str) -> Self {
        GroupLabel::Text(value.to_string())
    }
}

impl From<String> for GroupLabel {
    fn from(value: String) -> Self {
        GroupLabel::Text(value)
    }
}

impl From<&String> for GroupLabel {
    fn from(value: &String) -> Self {
        GroupLabel::Text(value.clone())
    }
}

macro_rules! label_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for GroupLabel {
            fn from(value: $t) -> Self {
                GroupLabel::Int(i64::from(value))
            }
        })*
    };
}

label_from_int!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<u64> for GroupLabel {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(GroupLabel::Uint(value), GroupLabel::Int)
    }
}

impl From<usize> for GroupLabel {
    fn from(value: usize) -> Self {
        GroupLabel::from(value as u64)
    }
}

impl From<f64> for GroupLabel {
    fn from(value: f64) -> Self {
        GroupLabel::Float(value)
    }
}

impl From<f32> for GroupLabel {
    fn from(value: f32) -> Self {
        GroupLabel::Float(f64::from(value))
    }
}

/// Canonical encoding of the reference rows into groups 0 and 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEncoding {
    /// `order[0]` maps to id 0, `order[1]` to id 1.
    pub order: [GroupLabel; 2],
    /// One id per reference row.
    pub ids: Vec<u8>,
}

impl GroupEncoding {
    /// Encode `labels`, either in ascending label order or in the explicit `group_order`.
    pub fn encode<L>(labels: &[L], group_order: Option<&[L]>) -> Result<Self, AxisError>
    where
        L: Clone + Into<GroupLabel>,
    {
        let labels: Vec<GroupLabel> = labels.iter().cloned().map(Into::into).collect();

        let order = match group_order {
            Some(order) => explicit_order(order)?,
            None => ascending_order(&labels)?,
        };

        let mut ids = Vec::with_capacity(labels.len());
        for (row, label) in labels.iter().enumerate() {
            let id = order.iter().position(|o| o == label).ok_or_else(|| {
                AxisError::DimensionMismatch(format!(
                    "label {label} at row {row} is not covered by group_order [{}, {}]",
                    order[0], order[1]
                ))
            })?;
            ids.push(id as u8);
        }

        let encoding = Self { order, ids };
        encoding.require_both_groups()?;
        Ok(encoding)
    }

    /// Number of rows in each group, indexed by id.
    pub fn counts(&self) -> [usize; 2] {
        let ones = self.ids.iter().filter(|&&id| id == 1).count();
        [self.ids.len() - ones, ones]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Both groups must own at least one row for a centroid to exist.
    pub fn require_both_groups(&self) -> Result<(), AxisError> {
        let counts = self.counts();
        for (id, count) in counts.iter().enumerate() {
            if *count == 0 {
                return Err(AxisError::InvalidGroupComposition(format!(
                    "group {} ({}) has no members among {} rows",
                    id,
                    self.order[id],
                    self.ids.len()
                )));
            }
        }
        Ok(())
    }
}

fn explicit_order<L>(order: &[L]) -> Result<[GroupLabel; 2], AxisError>
where
    L: Clone + Into<GroupLabel>,
{
    if order.len() != N_GROUPS {
        return Err(AxisError::DimensionMismatch(format!(
            "group_order must have exactly {N_GROUPS} entries, got {}",
            order.len()
        )));
    }
    let first: GroupLabel = order[0].clone().into();
    let second: GroupLabel = order[1].clone().into();
    if first == second {
        return Err(AxisError::InvalidGroupComposition(format!(
            "group_order repeats the label {first}"
        )));
    }
    Ok([first, second])
}

fn ascending_order(labels: &[GroupLabel]) -> Result<[GroupLabel; 2], AxisError> {
    let distinct: BTreeSet<&GroupLabel> = labels.iter().collect();
    if distinct.len() != N_GROUPS {
        return Err(AxisError::InvalidGroupComposition(format!(
            "expected exactly {N_GROUPS} distinct labels, found {}",
            distinct.len()
        )));
    }
    let mut it = distinct.into_iter().cloned();
    match (it.next(), it.next()) {
        (Some(first), Some(second)) => Ok([first, second]),
        _ => Err(AxisError::InvalidGroupComposition(
            "expected exactly two distinct labels".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_order_for_strings() {
        let enc = GroupEncoding::encode(&["rural", "urban", "rural"], None).unwrap();
        assert_eq!(enc.order, [GroupLabel::from("rural"), GroupLabel::from("urban")]);
        assert_eq!(enc.ids, vec![0, 1, 0]);
        assert_eq!(enc.counts(), [2, 1]);
    }

    #[test]
    fn ascending_order_for_integers() {
        let enc = GroupEncoding::encode(&[7, 3, 3, 7], None).unwrap();
        assert_eq!(enc.order, [GroupLabel::Int(3), GroupLabel::Int(7)]);
        assert_eq!(enc.ids, vec![1, 0, 0, 1]);
    }

    #[test]
    fn explicit_order_flips_ids() {
        let enc = GroupEncoding::encode(&["a", "b", "b"], Some(&["b", "a"][..])).unwrap();
        assert_eq!(enc.order[0], GroupLabel::from("b"));
        assert_eq!(enc.ids, vec![1, 0, 0]);
    }

    #[test]
    fn single_label_is_invalid() {
        let err = GroupEncoding::encode(&["x", "x", "x"], None).unwrap_err();
        assert!(matches!(err, AxisError::InvalidGroupComposition(_)));
    }

    #[test]
    fn three_labels_are_invalid() {
        let err = GroupEncoding::encode(&[0, 1, 2], None).unwrap_err();
        assert!(matches!(err, AxisError::InvalidGroupComposition(_)));
    }

    #[test]
    fn explicit_order_with_empty_group_is_invalid() {
        let err = GroupEncoding::encode(&["a", "a"], Some(&["a", "b"][..])).unwrap_err();
        assert!(matches!(err, AxisError::InvalidGroupComposition(_)));
    }

    #[test]
    fn order_must_cover_labels() {
        let err = GroupEncoding::encode(&["a", "b", "c"], Some(&["a", "b"][..])).unwrap_err();
        assert!(matches!(err, AxisError::DimensionMismatch(_)));
    }

    #[test]
    fn order_must_have_two_entries() {
        let err = GroupEncoding::encode(&["a", "b"], Some(&["a", "b", "c"][..])).unwrap_err();
        assert!(matches!(err, AxisError::DimensionMismatch(_)));
    }

    #[test]
    fn labels_keep_their_type_in_json() {
        let order = [GroupLabel::Int(1), GroupLabel::from("pos")];
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, r#"[1,"pos"]"#);
        let back: [GroupLabel; 2] = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn large_unsigned_labels_stay_distinct() {
        let big = u64::MAX;
        let labels = [big, big - 1, big, big - 1];
        let enc = GroupEncoding::encode(&labels, None).unwrap();
        assert_eq!(enc.order, [GroupLabel::Uint(big - 1), GroupLabel::Uint(big)]);
        assert_eq!(enc.ids, vec![1, 0, 1, 0]);

        let sizes: [usize; 2] = [usize::MAX, usize::MAX - 1];
        let enc = GroupEncoding::encode(&sizes, None).unwrap();
        assert_eq!(enc.ids, vec![1, 0]);
    }

    #[test]
    fn small_unsigned_labels_equal_signed_ones() {
        assert_eq!(GroupLabel::from(5u64), GroupLabel::Int(5));
        assert_eq!(GroupLabel::Uint(5), GroupLabel::Int(5));
        assert!(GroupLabel::Int(-1) < GroupLabel::Uint(u64::MAX));
    }

    #[test]
    fn float_labels_are_ordered() {
        let enc = GroupEncoding::encode(&[0.5, -1.5, 0.5], None).unwrap();
        assert_eq!(enc.order, [GroupLabel::Float(-1.5), GroupLabel::Float(0.5)]);
        assert_eq!(enc.ids, vec![1, 0, 1]);
    }

    #[test]
    fn mixed_kinds_order_integers_floats_strings() {
        let mut labels = vec![
            GroupLabel::from("a"),
            GroupLabel::Float(-10.0),
            GroupLabel::Int(100),
        ];
        labels.sort();
        assert_eq!(
            labels,
            vec![GroupLabel::Int(100), GroupLabel::Float(-10.0), GroupLabel::from("a")]
        );
    }

    #[test]
    fn numeric_labels_keep_their_kind_in_json() {
        let order = [GroupLabel::Uint(u64::MAX), GroupLabel::Float(2.0)];
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, "[18446744073709551615,2.0]");
        let back: [GroupLabel; 2] = serde_json::from_str(&json).unwrap();
        assert!(matches!(back[0], GroupLabel::Uint(u64::MAX)));
        assert!(matches!(back[1], GroupLabel::Float(v) if v == 2.0));
    }
}
