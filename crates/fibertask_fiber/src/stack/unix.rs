#![expect(unsafe_code, reason = "mmap/mprotect have no safe wrapper")]

use std::io::Error;
use std::ptr;

pub struct Stack {
    base: *mut libc::c_void,
    map_len: usize,
    page_size: usize,
}

impl Stack {
    pub fn new(size: usize) -> std::io::Result<Self> {
        let page_size = page_size();
        let map_len = size
            .checked_add(page_size - 1)
            .map(|n| n & !(page_size - 1))
            .and_then(|n| n.checked_add(page_size))
            .expect("integer overflow while calculating stack size");

        cfg_if::cfg_if! {
            if #[cfg(target_os = "openbsd")] {
                let flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_STACK;
            } else {
                let flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
            }
        }

        unsafe {
            let base = libc::mmap(ptr::null_mut(), map_len, libc::PROT_NONE, flags, -1, 0);
            if base == libc::MAP_FAILED {
                return Err(Error::last_os_error());
            }

            // Leave the lowest page as an inaccessible guard page; make the
            // rest read/write.
            if libc::mprotect(
                base.cast::<u8>().add(page_size).cast(),
                map_len - page_size,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                let err = Error::last_os_error();
                libc::munmap(base, map_len);
                return Err(err);
            }

            Ok(Self {
                base,
                map_len,
                page_size,
            })
        }
    }

    pub fn top(&self) -> *mut u8 {
        // Safety: base..base+map_len is the mapping we just created above.
        unsafe { self.base.cast::<u8>().add(self.map_len) }
    }

    pub fn usable_size(&self) -> usize {
        self.map_len - self.page_size
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // Safety: base/map_len describe exactly the mapping created in `new`.
        let ret = unsafe { libc::munmap(self.base, self.map_len) };
        debug_assert_eq!(ret, 0);
    }
}

fn page_size() -> usize {
    // Safety: sysconf with a well-known name is always safe to call.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    assert!(page.is_power_of_two());
    page
}
