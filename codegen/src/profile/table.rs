use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use snafu::OptionExt;
use tracing::trace;

use simdgen_dtype::ElemType;

use super::{Profile, Target, neon, sve, x86};
use crate::error::{ProfileMissingSnafu, Result};

/// All registered profiles, keyed by (target, element type).
///
/// Built on first access and never mutated afterwards, so lookups need no locking.
pub struct ProfileTable {
    profiles: BTreeMap<(Target, ElemType), Profile>,
}

static TABLE: Lazy<ProfileTable> = Lazy::new(ProfileTable::build);

impl ProfileTable {
    fn build() -> Self {
        let profiles = [
            neon::f32(),
            neon::f64(),
            neon::f16(),
            neon::bf16(),
            neon::u8(),
            neon::u32(),
            neon::u64(),
            neon::i32(),
            neon::i64(),
            x86::avx2_f32(),
            x86::avx2_f16(),
            x86::avx512_f32(),
            x86::avx512_f16(),
            x86::avx512_bf16(),
            sve::darwin_f32(),
            sve::darwin_f64(),
            sve::linux_f32(),
            sve::linux_f64(),
        ];
        trace!(count = profiles.len(), "profile table built");
        Self { profiles: profiles.into_iter().map(|p| ((p.target, p.elem), p)).collect() }
    }

    pub fn global() -> &'static ProfileTable {
        &TABLE
    }

    pub fn get(&self, target: Target, elem: ElemType) -> Result<&Profile> {
        self.profiles.get(&(target, elem)).context(ProfileMissingSnafu { target, elem })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Validate every registered profile, stopping at the first incomplete one.
    pub fn validate(&self) -> Result<()> {
        self.iter().try_for_each(Profile::validate)
    }
}

/// Look up the profile for a (target, element type) pair.
pub fn profile(target: Target, elem: ElemType) -> Result<&'static Profile> {
    ProfileTable::global().get(target, elem)
}
