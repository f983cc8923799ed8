//! Result codes carried in response headers.
//!
//! Values are defined by the secure-world firmware; the host only needs the
//! handful it reacts to.

pub const SUCCESS: i32 = 0;

pub const OUT_OF_MEMORY: i32 = 0x1001;
pub const INVALID_PARAMS: i32 = 0x1002;
pub const INTERNAL_ERROR: i32 = 0x1003;
/// Returned by the host itself when an inbound filter rejects a command.
pub const OPERATION_NOT_PERMITTED: i32 = 0x1004;

/// The VM holds no package for the requested applet.
pub const PACKAGE_NOT_FOUND: i32 = 0x2001;
/// A download found the package already present.
pub const PACKAGE_EXIST: i32 = 0x2002;
pub const APPLET_BLOCKED: i32 = 0x2003;

/// Applet output exceeds the capacity declared by the caller.
pub const APPLET_SMALL_BUFFER: i32 = 0x3001;
/// The applet raised an uncaught exception and its session was killed.
pub const UNCAUGHT_EXCEPTION: i32 = 0x3002;
/// The applet exceeded its watchdog budget and its session was killed.
pub const WD_TIMEOUT: i32 = 0x3003;
/// Close was refused because the applet still holds an internal session.
pub const IAC_EXIST_INTERNAL_SESSION: i32 = 0x3004;

/// Symbolic name of a result code.
pub fn describe(code: i32) -> &'static str {
    match code {
        SUCCESS => "SUCCESS",
        OUT_OF_MEMORY => "OUT_OF_MEMORY",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        OPERATION_NOT_PERMITTED => "OPERATION_NOT_PERMITTED",
        PACKAGE_NOT_FOUND => "PACKAGE_NOT_FOUND",
        PACKAGE_EXIST => "PACKAGE_EXIST",
        APPLET_BLOCKED => "APPLET_BLOCKED",
        APPLET_SMALL_BUFFER => "APPLET_SMALL_BUFFER",
        UNCAUGHT_EXCEPTION => "UNCAUGHT_EXCEPTION",
        WD_TIMEOUT => "WD_TIMEOUT",
        IAC_EXIST_INTERNAL_SESSION => "IAC_EXIST_INTERNAL_SESSION",
        _ => "UNKNOWN",
    }
}

/// True for codes that mean the applet's session was terminated by a fault.
pub fn is_fault(code: i32) -> bool {
    matches!(code, UNCAUGHT_EXCEPTION | WD_TIMEOUT)
}
