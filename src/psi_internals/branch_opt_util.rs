//! Branch hints, stable-Rust style: a call to a `#[cold]` function marks the path it sits on as unlikely.

#[cold]
#[inline(always)]
pub const fn cold() {}

#[inline(always)]
pub const fn likely(b: bool) -> bool {
    if !b {
        cold();
    }
    b
}

#[inline(always)]
pub const fn unlikely(b: bool) -> bool {
    if b {
        cold();
    }
    b
}
