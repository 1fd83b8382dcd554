//! # Bin Store
//!
//! Ordered container of bins. Bins live in fixed groups of 16 addressed
//! by `(group_idx, offset)` over the non-negative score `id + 443636`,
//! so group order matches id order and one group load covers up to 16
//! adjacent bins of a swap. Groups sit in a `BTreeMap`, giving seeks a
//! logarithmic bound over non-empty groups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lattice_math::price_math;

use crate::bin::Bin;
use crate::constants::{BIN_GROUP_SIZE, MAX_BIN_ID, MIN_BIN_ID, SCORE_OFFSET};
use crate::error::{DlmmError, Result};

/// One group of up to 16 bins with an occupancy mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinGroup {
    used_mask: u16,
    bins: Vec<Option<Bin>>,
}

impl BinGroup {
    fn new() -> Self {
        Self {
            used_mask: 0,
            bins: vec![None; BIN_GROUP_SIZE as usize],
        }
    }

    /// Highest used offset strictly below `offset`, if any.
    fn used_below(&self, offset: u32) -> Option<u32> {
        let below = self.used_mask & ((1u16 << offset) - 1);
        if below == 0 {
            None
        } else {
            Some(15 - below.leading_zeros())
        }
    }

    /// Lowest used offset strictly above `offset`, if any.
    fn used_above(&self, offset: u32) -> Option<u32> {
        if offset + 1 >= BIN_GROUP_SIZE {
            return None;
        }
        let above = self.used_mask & !((1u32 << (offset + 1)) - 1) as u16;
        if above == 0 {
            None
        } else {
            Some(above.trailing_zeros())
        }
    }

    fn highest_used(&self) -> Option<u32> {
        if self.used_mask == 0 {
            None
        } else {
            Some(15 - self.used_mask.leading_zeros())
        }
    }

    fn lowest_used(&self) -> Option<u32> {
        if self.used_mask == 0 {
            None
        } else {
            Some(self.used_mask.trailing_zeros())
        }
    }
}

/// The ordered bin container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinStore {
    groups: BTreeMap<u32, BinGroup>,
    len: usize,
}

/// Validates a bin id against the supported range.
pub fn check_bin_id(id: i32) -> Result<()> {
    if price_math::is_valid_bin_id(id) {
        Ok(())
    } else {
        Err(DlmmError::BinIdRange)
    }
}

fn score_of(id: i32) -> u32 {
    debug_assert!((MIN_BIN_ID..=MAX_BIN_ID).contains(&id));
    (id + SCORE_OFFSET) as u32
}

fn id_of(group_idx: u32, offset: u32) -> i32 {
    (group_idx * BIN_GROUP_SIZE + offset) as i32 - SCORE_OFFSET
}

fn locate(id: i32) -> (u32, u32) {
    let score = score_of(id);
    (score / BIN_GROUP_SIZE, score % BIN_GROUP_SIZE)
}

impl BinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: i32) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: i32) -> Option<&Bin> {
        check_bin_id(id).ok()?;
        let (group_idx, offset) = locate(id);
        self.groups
            .get(&group_idx)
            .and_then(|group| group.bins[offset as usize].as_ref())
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut Bin> {
        check_bin_id(id).ok()?;
        let (group_idx, offset) = locate(id);
        self.groups
            .get_mut(&group_idx)
            .and_then(|group| group.bins[offset as usize].as_mut())
    }

    /// Fetches the bin at `id`, creating it with `make` when absent.
    pub fn get_or_insert_with(
        &mut self,
        id: i32,
        make: impl FnOnce() -> Result<Bin>,
    ) -> Result<&mut Bin> {
        check_bin_id(id)?;
        let (group_idx, offset) = locate(id);
        let group = self.groups.entry(group_idx).or_insert_with(BinGroup::new);
        let slot = &mut group.bins[offset as usize];
        if slot.is_none() {
            let bin = make()?;
            debug_assert_eq!(bin.id, id);
            *slot = Some(bin);
            group.used_mask |= 1 << offset;
            self.len += 1;
        }
        Ok(slot.as_mut().expect("slot populated above"))
    }

    pub fn insert(&mut self, bin: Bin) -> Result<()> {
        check_bin_id(bin.id)?;
        let (group_idx, offset) = locate(bin.id);
        let group = self.groups.entry(group_idx).or_insert_with(BinGroup::new);
        let slot = &mut group.bins[offset as usize];
        if slot.is_some() {
            return Err(DlmmError::InvalidInput);
        }
        *slot = Some(bin);
        group.used_mask |= 1 << offset;
        self.len += 1;
        Ok(())
    }

    /// Removes the bin at `id`; the owning group is dropped once its
    /// mask clears.
    pub fn remove(&mut self, id: i32) -> Result<Bin> {
        check_bin_id(id)?;
        let (group_idx, offset) = locate(id);
        let group = self.groups.get_mut(&group_idx).ok_or(DlmmError::BinMissing)?;
        let bin = group.bins[offset as usize]
            .take()
            .ok_or(DlmmError::BinMissing)?;
        group.used_mask &= !(1 << offset);
        if group.used_mask == 0 {
            self.groups.remove(&group_idx);
        }
        self.len -= 1;
        Ok(bin)
    }

    /// Greatest occupied id at or below `id`.
    pub fn floor_at(&self, id: i32) -> Option<i32> {
        if self.is_empty() || id < MIN_BIN_ID {
            return None;
        }
        let id = id.min(MAX_BIN_ID);
        let (group_idx, offset) = locate(id);

        if let Some(group) = self.groups.get(&group_idx) {
            if group.used_mask & (1 << offset) != 0 {
                return Some(id);
            }
            if let Some(found) = group.used_below(offset) {
                return Some(id_of(group_idx, found));
            }
        }

        self.groups
            .range(..group_idx)
            .next_back()
            .map(|(idx, group)| {
                let found = group.highest_used().expect("groups are never empty");
                id_of(*idx, found)
            })
    }

    /// Least occupied id at or above `id`.
    pub fn ceil_at(&self, id: i32) -> Option<i32> {
        if self.is_empty() || id > MAX_BIN_ID {
            return None;
        }
        let id = id.max(MIN_BIN_ID);
        let (group_idx, offset) = locate(id);

        if let Some(group) = self.groups.get(&group_idx) {
            if group.used_mask & (1 << offset) != 0 {
                return Some(id);
            }
            if let Some(found) = group.used_above(offset) {
                return Some(id_of(group_idx, found));
            }
        }

        self.groups
            .range(group_idx + 1..)
            .next()
            .map(|(idx, group)| {
                let found = group.lowest_used().expect("groups are never empty");
                id_of(*idx, found)
            })
    }

    /// Greatest occupied id strictly below `id`.
    pub fn next_below(&self, id: i32) -> Option<i32> {
        if id <= MIN_BIN_ID {
            return None;
        }
        self.floor_at(id - 1)
    }

    /// Least occupied id strictly above `id`.
    pub fn next_above(&self, id: i32) -> Option<i32> {
        if id >= MAX_BIN_ID {
            return None;
        }
        self.ceil_at(id + 1)
    }

    /// Bins in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Bin> {
        self.groups
            .values()
            .flat_map(|group| group.bins.iter().filter_map(|slot| slot.as_ref()))
    }
}
