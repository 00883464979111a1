use std::io;
use std::ptr;

/// Default code buffer size per macro: 64 KiB.
pub const DEFAULT_CODE_BUF_SIZE: usize = 64 * 1024;

/// JIT code buffer backed by mmap'd memory.
///
/// Each compiled macro owns one buffer. The buffer is written while
/// writable, then flipped to executable before the first call (W^X: never
/// both). Writes past the end do not panic; they are dropped and the buffer
/// is marked exhausted so the compiler can bail out.
pub struct CodeBuffer {
    ptr: *mut u8,
    size: usize,
    offset: usize,
    exhausted: bool,
}

// SAFETY: CodeBuffer owns its mmap'd memory exclusively.
unsafe impl Send for CodeBuffer {}

impl CodeBuffer {
    /// Allocate a new code buffer of the given size (rounded up to page size).
    pub fn new(size: usize) -> io::Result<Self> {
        let page_size = page_size();
        let size = (size.max(1) + page_size - 1) & !(page_size - 1);

        // SAFETY: mmap with MAP_ANONYMOUS | MAP_PRIVATE, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: ptr as *mut u8,
            size,
            offset: 0,
            exhausted: false,
        })
    }

    /// Current write offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Remaining writable bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.size - self.offset
    }

    /// Whether an emit was dropped for lack of space.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Raw pointer to the start of the buffer.
    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Pointer at a given offset.
    #[inline]
    pub fn ptr_at(&self, offset: usize) -> *const u8 {
        assert!(offset <= self.size);
        // SAFETY: offset is within the mapping.
        unsafe { self.ptr.add(offset) as *const u8 }
    }

    /// Reserve `len` bytes at the write position. Returns false (and marks
    /// the buffer exhausted) when they do not fit.
    #[inline]
    fn reserve(&mut self, len: usize) -> bool {
        if self.exhausted || len > self.remaining() {
            self.exhausted = true;
            return false;
        }
        true
    }

    // -- Emit methods --

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        if self.reserve(1) {
            unsafe { self.ptr.add(self.offset).write(val) };
            self.offset += 1;
        }
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        if self.reserve(4) {
            unsafe { (self.ptr.add(self.offset) as *mut u32).write_unaligned(val) };
            self.offset += 4;
        }
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        if self.reserve(8) {
            unsafe { (self.ptr.add(self.offset) as *mut u64).write_unaligned(val) };
            self.offset += 8;
        }
    }

    #[inline]
    pub fn emit_bytes(&mut self, data: &[u8]) {
        if self.reserve(data.len()) {
            unsafe {
                ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(self.offset), data.len());
            }
            self.offset += data.len();
        }
    }

    /// Patch a u32 at the given offset (for back-patching jumps).
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        assert!(offset + 4 <= self.offset);
        unsafe { (self.ptr.add(offset) as *mut u32).write_unaligned(val) };
    }

    /// Read a u32 at the given offset.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.offset);
        unsafe { (self.ptr.add(offset) as *const u32).read_unaligned() }
    }

    // -- Permission management (W^X) --

    /// Make the buffer executable and non-writable.
    ///
    /// On x86-64 the instruction cache is coherent with data writes; the
    /// `mprotect` call is the only synchronization needed before running
    /// freshly written code.
    pub fn set_executable(&self) -> io::Result<()> {
        let ret = unsafe {
            libc::mprotect(
                self.ptr as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Make the buffer writable and non-executable.
    pub fn set_writable(&self) -> io::Result<()> {
        let ret = unsafe {
            libc::mprotect(
                self.ptr as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Get the generated code as a byte slice (up to current offset).
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+offset has been written.
        unsafe { std::slice::from_raw_parts(self.ptr, self.offset) }
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

impl std::fmt::Debug for CodeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeBuffer")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish()
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
