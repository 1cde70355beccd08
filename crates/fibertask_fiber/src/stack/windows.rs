#![expect(unsafe_code, reason = "VirtualAlloc/VirtualProtect have no safe wrapper")]

use std::io::Error;
use std::ptr;
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE, VirtualAlloc, VirtualFree,
    VirtualProtect, MEM_RELEASE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub struct Stack {
    base: *mut std::ffi::c_void,
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

        // Safety: reserving and committing a fresh anonymous region.
        unsafe {
            let base = VirtualAlloc(ptr::null(), map_len, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE);
            if base.is_null() {
                return Err(Error::last_os_error());
            }

            let mut old_protect = 0u32;
            if VirtualProtect(base, page_size, PAGE_NOACCESS, &mut old_protect) == 0 {
                let err = Error::last_os_error();
                VirtualFree(base, 0, MEM_RELEASE);
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
        // Safety: base describes exactly the mapping created in `new`.
        let ret = unsafe { VirtualFree(self.base, 0, MEM_RELEASE) };
        debug_assert_ne!(ret, 0);
    }
}

fn page_size() -> usize {
    // Safety: `info` is a valid out-parameter for the duration of the call.
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    }
}
