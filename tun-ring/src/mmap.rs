//! # Ring Region Mapping
//!
//! ## Purpose
//!
//! Owns the anonymous mapped region that backs both session rings. The
//! region is handed to the driver by address at registration time, so it has
//! to stay mapped and pinned at one address for the whole session.
//!
//! ## How it works
//!
//! `OwnedMmap` wraps the raw `libc::mmap` pointer and unmaps it on drop.
//! Anonymous mappings come back zero-filled, which is exactly the initial
//! ring state the protocol expects (all cursors at zero). The region can
//! optionally be backed by 2 MiB huge pages to cut TLB pressure on large
//! rings; when the caller does not care we probe `/proc/meminfo` and use
//! them only if some are actually free.

use std::fs::File;
use std::io::{BufRead as _, BufReader};
use std::{io, ptr};

/// Owner of a memory-mapped region. Unmaps on drop.
pub struct OwnedMmap(*mut libc::c_void, usize);

impl OwnedMmap {
    /// Maps `size` bytes of zeroed anonymous memory, rounded up to the page
    /// size in use.
    pub fn mmap(size: usize, huge_page: Option<bool>) -> io::Result<OwnedMmap> {
        let huge_tlb = match huge_page {
            Some(yes) => yes,
            None => free_hugepages().unwrap_or(0) > 0,
        };
        match OwnedMmap::mmap_with(size, huge_tlb) {
            // auto-detected huge pages can still be unusable (reserved,
            // cgroup-limited); only an explicit request is allowed to fail
            Err(e) if huge_tlb && huge_page.is_none() => {
                log::warn!("huge page mapping failed, using standard pages: {e}");
                OwnedMmap::mmap_with(size, false)
            }
            mapped => mapped,
        }
    }

    fn mmap_with(size: usize, huge_tlb: bool) -> io::Result<OwnedMmap> {
        let page_size = if huge_tlb {
            2 * 1024 * 1024
        } else {
            unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
        };
        let aligned_size = (size + page_size - 1) & !(page_size - 1);
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                aligned_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE
                    | libc::MAP_ANONYMOUS
                    | if huge_tlb {
                        libc::MAP_HUGETLB | libc::MAP_HUGE_2MB
                    } else {
                        0
                    },
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(OwnedMmap(ptr, aligned_size))
    }

    pub fn as_u8_ptr(&self) -> *mut u8 {
        self.0 as *mut u8
    }

    pub fn len(&self) -> usize {
        self.1
    }

    pub fn is_empty(&self) -> bool {
        self.1 == 0
    }
}

impl Drop for OwnedMmap {
    fn drop(&mut self) {
        unsafe {
            if self.0 != libc::MAP_FAILED && !self.0.is_null() {
                if libc::munmap(self.0, self.1) < 0 {
                    log::error!("failed to unmap ring region: {}", io::Error::last_os_error());
                }
            }
        }
    }
}

/// Number of free 2 MiB huge pages, from `/proc/meminfo`. Only pages of the
/// default 2048 kB size count.
fn free_hugepages() -> io::Result<u64> {
    let reader = BufReader::new(File::open("/proc/meminfo")?);
    let (mut free, mut size_kb) = (0u64, 0u64);
    for line in reader.lines() {
        let line = line?;
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_end_matches(" kB");
            match key.trim() {
                "HugePages_Free" => free = value.parse().map_err(io::Error::other)?,
                "Hugepagesize" => size_kb = value.parse().map_err(io::Error::other)?,
                _ => {}
            }
        }
    }
    Ok(if size_kb == 2048 { free } else { 0 })
}
