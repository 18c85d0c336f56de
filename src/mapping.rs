//! Particle mapping: the sparse-partition protocol used by parallel
//! writers.
//!
//! A mapping block translates the dense local row indices of the particle
//! data blocks that follow it into global particle numbers. Writers each
//! own a disjoint range, emit their mapping plus data blocks, and a reader
//! unions the groups per frame. Within one frame set no two mapping blocks
//! may claim the same global particle, and each table must be injective.

use crate::bytes::ByteOrders;
use crate::error::{Error, Result};
use crate::schema::blocks::BlockId;
use std::collections::HashSet;
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticleMapping {
    /// First particle slot of the frame set's local axis this block covers.
    num_first_particle: i64,
    /// Global particle number for each covered slot, in slot order.
    real_particle_numbers: Vec<i64>,
}

impl ParticleMapping {
    /// Builds a mapping for slots `[num_first_particle,
    /// num_first_particle + table.len())`. The table must be injective.
    pub fn new(num_first_particle: i64, table: Vec<i64>) -> Result<Self> {
        if num_first_particle < 0 {
            return Err(Error::InvalidArgument("negative first particle number"));
        }
        if table.is_empty() {
            return Err(Error::InvalidCount {
                id: BlockId::PARTICLE_MAPPING,
                count: 0,
            });
        }
        let mut seen = HashSet::with_capacity(table.len());
        for &global in &table {
            if !seen.insert(global) {
                return Err(Error::MappingDuplicate { particle: global });
            }
        }
        Ok(Self {
            num_first_particle,
            real_particle_numbers: table,
        })
    }

    #[must_use]
    pub fn num_first_particle(&self) -> i64 {
        self.num_first_particle
    }

    #[must_use]
    pub fn n_particles(&self) -> i64 {
        self.real_particle_numbers.len() as i64
    }

    #[must_use]
    pub fn real_particle_numbers(&self) -> &[i64] {
        &self.real_particle_numbers
    }

    /// Global number of data-block row `local`, counted from 0.
    #[must_use]
    pub fn to_real(&self, local: i64) -> Option<i64> {
        usize::try_from(local)
            .ok()
            .and_then(|i| self.real_particle_numbers.get(i))
            .copied()
    }

    /// The first global particle shared with `other`, if any.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Option<i64> {
        let mine: HashSet<i64> = self.real_particle_numbers.iter().copied().collect();
        other
            .real_particle_numbers
            .iter()
            .find(|global| mine.contains(global))
            .copied()
    }

    pub fn write_contents<W: Write>(&self, w: &mut W, orders: ByteOrders) -> Result<()> {
        orders.write_i64(w, self.num_first_particle)?;
        orders.write_i64(w, self.n_particles())?;
        for &global in &self.real_particle_numbers {
            orders.write_i64(w, global)?;
        }
        Ok(())
    }

    pub fn read_contents<R: Read>(r: &mut R, orders: ByteOrders) -> Result<Self> {
        let num_first_particle = orders.read_i64(r)?;
        let n_particles = orders.read_i64(r)?;
        if n_particles <= 0 {
            return Err(Error::InvalidCount {
                id: BlockId::PARTICLE_MAPPING,
                count: n_particles,
            });
        }
        let mut table = Vec::new();
        for _ in 0..n_particles {
            table.push(orders.read_i64(r)?);
        }
        Self::new(num_first_particle, table)
    }
}

/// Identity table covering `[first, first + count)`, the mapping implied by
/// a particle data block that no mapping block precedes.
#[must_use]
pub fn identity_table(first: i64, count: i64) -> Vec<i64> {
    (first..first + count).collect()
}

/// Verifies that no global particle is claimed by more than one mapping.
pub fn check_disjoint<'a, I>(mappings: I) -> Result<()>
where
    I: IntoIterator<Item = &'a ParticleMapping>,
{
    let mut seen = HashSet::new();
    for mapping in mappings {
        for &global in &mapping.real_particle_numbers {
            if !seen.insert(global) {
                return Err(Error::MappingOverlap { particle: global });
            }
        }
    }
    Ok(())
}
