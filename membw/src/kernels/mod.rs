//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Memory access kernels.
//!
//! Each kernel streams once over a byte region with one access strategy.
//! Store kernels overwrite every byte with a non-zero pattern; load kernels
//! read every element into an accumulator that is checked against
//! [`crate::POISON`] so the reads cannot be optimized away.
//!
//! The SIMD, string-instruction and prefetch kernels are x86_64 specific and
//! live in their own modules. Which of them can actually run is decided once at
//! startup through [`Kernel::available`].

mod scalar;
#[cfg(target_arch = "x86_64")]
mod avx;
#[cfg(target_arch = "x86_64")]
mod sse;
#[cfg(target_arch = "x86_64")]
mod string;

use core::str::FromStr;

/// Pattern written by the word and vector store kernels. Every byte is
/// non-zero.
pub const STORE_PATTERN: u64 = 0xdead_beef_dead_beef;

/// Byte written by [`Kernel::StoreMemset`].
pub const MEMSET_BYTE: u8 = 0xFF;

/// Whether a kernel writes or reads the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Store,
    Load,
}

/// CPU feature a kernel needs beyond the x86_64 baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFeature {
    Sse41,
    Avx,
}

impl CpuFeature {
    /// Whether the executing CPU supports this feature.
    pub fn is_detected(self) -> bool {
        #[cfg(target_arch = "x86_64")]
        {
            match self {
                CpuFeature::Sse41 => std::arch::is_x86_feature_detected!("sse4.1"),
                CpuFeature::Avx => std::arch::is_x86_feature_detected!("avx"),
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CpuFeature::Sse41 => "sse4.1",
            CpuFeature::Avx => "avx",
        }
    }
}

/// A memory access strategy.
///
/// Declaration order is the order the driver runs them in: loads first, then
/// stores, with the library fill as the closing baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    #[cfg(target_arch = "x86_64")]
    RepLodsq,
    LoadLoop,
    #[cfg(target_arch = "x86_64")]
    LoadSse,
    #[cfg(target_arch = "x86_64")]
    LoadAvx,
    #[cfg(target_arch = "x86_64")]
    LoadPrefetchAvx,
    StoreLoop,
    #[cfg(target_arch = "x86_64")]
    RepStosq,
    #[cfg(target_arch = "x86_64")]
    StoreSse,
    #[cfg(target_arch = "x86_64")]
    StoreNontemporalSse,
    #[cfg(target_arch = "x86_64")]
    StoreAvx,
    #[cfg(target_arch = "x86_64")]
    StoreNontemporalAvx,
    StoreMemset,
}

impl Kernel {
    /// Every kernel compiled for this target, in run order.
    pub const ALL: &'static [Kernel] = &[
        #[cfg(target_arch = "x86_64")]
        Kernel::RepLodsq,
        Kernel::LoadLoop,
        #[cfg(target_arch = "x86_64")]
        Kernel::LoadSse,
        #[cfg(target_arch = "x86_64")]
        Kernel::LoadAvx,
        #[cfg(target_arch = "x86_64")]
        Kernel::LoadPrefetchAvx,
        Kernel::StoreLoop,
        #[cfg(target_arch = "x86_64")]
        Kernel::RepStosq,
        #[cfg(target_arch = "x86_64")]
        Kernel::StoreSse,
        #[cfg(target_arch = "x86_64")]
        Kernel::StoreNontemporalSse,
        #[cfg(target_arch = "x86_64")]
        Kernel::StoreAvx,
        #[cfg(target_arch = "x86_64")]
        Kernel::StoreNontemporalAvx,
        Kernel::StoreMemset,
    ];

    /// The kernels this CPU can run, in run order.
    pub fn available() -> Vec<Kernel> {
        Self::ALL.iter().copied().filter(|kernel| kernel.is_supported()).collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            #[cfg(target_arch = "x86_64")]
            Kernel::RepLodsq => "memory_rep_lodsq",
            Kernel::LoadLoop => "memory_load_loop",
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadSse => "memory_load_sse",
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadAvx => "memory_load_avx",
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadPrefetchAvx => "memory_load_prefetch_avx",
            Kernel::StoreLoop => "memory_store_loop",
            #[cfg(target_arch = "x86_64")]
            Kernel::RepStosq => "memory_rep_stosq",
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreSse => "memory_store_sse",
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreNontemporalSse => "memory_store_nontemporal_sse",
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreAvx => "memory_store_avx",
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreNontemporalAvx => "memory_store_nontemporal_avx",
            Kernel::StoreMemset => "memory_store_memset",
        }
    }

    pub fn access_kind(self) -> AccessKind {
        match self {
            #[cfg(target_arch = "x86_64")]
            Kernel::RepLodsq | Kernel::LoadSse | Kernel::LoadAvx | Kernel::LoadPrefetchAvx => {
                AccessKind::Load
            }
            Kernel::LoadLoop => AccessKind::Load,
            _ => AccessKind::Store,
        }
    }

    /// Size in bytes of the element the kernel moves per step. Regions passed
    /// to [`Kernel::run`] must be aligned to, and sized in multiples of, this.
    pub fn element_width(self) -> usize {
        match self {
            Kernel::StoreMemset => 1,
            Kernel::LoadLoop | Kernel::StoreLoop => size_of::<u64>(),
            #[cfg(target_arch = "x86_64")]
            Kernel::RepLodsq | Kernel::RepStosq => size_of::<u64>(),
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadSse | Kernel::StoreSse | Kernel::StoreNontemporalSse => 16,
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadAvx
            | Kernel::LoadPrefetchAvx
            | Kernel::StoreAvx
            | Kernel::StoreNontemporalAvx => 32,
        }
    }

    pub fn required_feature(self) -> Option<CpuFeature> {
        match self {
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadSse | Kernel::StoreSse | Kernel::StoreNontemporalSse => {
                Some(CpuFeature::Sse41)
            }
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadAvx
            | Kernel::LoadPrefetchAvx
            | Kernel::StoreAvx
            | Kernel::StoreNontemporalAvx => Some(CpuFeature::Avx),
            _ => None,
        }
    }

    pub fn is_supported(self) -> bool {
        self.required_feature().is_none_or(CpuFeature::is_detected)
    }

    /// Run the kernel once over `region`.
    ///
    /// # Panics
    ///
    /// Panics if `region` is not aligned to or sized in multiples of
    /// [`Kernel::element_width`], if the CPU lacks the kernel's feature, or if a
    /// load kernel's accumulator ends up equal to the poison sentinel. All of
    /// these are fatal: the first two are caller bugs, the last one means the
    /// build dropped the memory traffic being measured.
    #[inline]
    pub fn run(self, region: &mut [u8]) {
        let width = self.element_width();
        assert!(
            region.as_ptr() as usize % width == 0 && region.len() % width == 0,
            "{}: region {:p}+{} is not aligned to {} bytes",
            self.name(),
            region.as_ptr(),
            region.len(),
            width
        );
        assert!(self.is_supported(), "{}: unsupported on this CPU", self.name());

        match self {
            Kernel::LoadLoop => scalar::load_loop(region),
            Kernel::StoreLoop => scalar::store_loop(region),
            Kernel::StoreMemset => scalar::store_memset(region),
            // Safety for the arms below: alignment, length and CPU features were
            // checked above.
            #[cfg(target_arch = "x86_64")]
            Kernel::RepLodsq => unsafe { string::rep_lodsq(region.as_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::RepStosq => unsafe { string::rep_stosq(region.as_mut_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadSse => unsafe { sse::load(region.as_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreSse => unsafe { sse::store(region.as_mut_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreNontemporalSse => unsafe {
                sse::store_nontemporal(region.as_mut_ptr(), region.len())
            },
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadAvx => unsafe { avx::load(region.as_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::LoadPrefetchAvx => unsafe { avx::load_prefetch(region.as_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreAvx => unsafe { avx::store(region.as_mut_ptr(), region.len()) },
            #[cfg(target_arch = "x86_64")]
            Kernel::StoreNontemporalAvx => unsafe {
                avx::store_nontemporal(region.as_mut_ptr(), region.len())
            },
        }
    }
}

impl core::fmt::Display for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Kernel {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kernel| kernel.name() == name)
            .ok_or_else(|| format!("unknown kernel: {}", name))
    }
}

/// Fatal check that a load kernel's accumulator does not hold the poison
/// sentinel.
#[inline]
#[track_caller]
fn guard(kernel: &str, poisoned: bool) {
    assert!(
        !poisoned,
        "{}: accumulator equals the poison sentinel, loads were optimized away",
        kernel
    );
}
