/// Sysfs helpers for the touch/keypad hardware interfaces of spec.md §6.
///
/// Every path is taken as a parameter rather than hardcoded so tests can
/// redirect reads/writes into a `tempfile::TempDir` fixture instead of
/// the real `/sys` tree. Failures here are never fatal: per §7 "sysfs
/// write failed: log; some features become no-ops; policy must remain
/// functional", so every function here returns `Result` for the caller
/// to log-and-continue rather than propagate upward as a hard error.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::error::MceError;
use crate::core::evdev::codes::KEY_CNT;

const GPIO_KEY_DISABLE_WORDS: usize = KEY_CNT.div_ceil(64);

/// Reads the newline-terminated lowercase hex little-endian bitmap and
/// returns it as `u64` words, most-significant word last (little-endian
/// word order matching the kernel's own bitmap printer).
pub fn read_gpio_key_disable(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading gpio_key_disable at {:?}", path))?;
    let mut words = Vec::with_capacity(GPIO_KEY_DISABLE_WORDS);
    for chunk in content.trim().split(' ') {
        let word = u64::from_str_radix(chunk, 16)
            .with_context(|| format!("malformed gpio_key_disable word {:?}", chunk))?;
        words.push(word);
    }
    Ok(words)
}

/// Read-modify-write: sets or clears `key_code`'s bit and writes the
/// full bitmap back. Not safe against concurrent writers (the kernel's
/// LED subsystem also writes this node); per spec.md §9 this is
/// documented, not locked.
pub fn set_key_disabled(path: impl AsRef<Path>, key_code: u16, disabled: bool) -> Result<()> {
    let path = path.as_ref();
    let mut words = read_gpio_key_disable(path).unwrap_or_else(|_| vec![0u64; GPIO_KEY_DISABLE_WORDS]);
    words.resize(GPIO_KEY_DISABLE_WORDS, 0);
    let idx = key_code as usize / 64;
    let bit = key_code as usize % 64;
    if idx >= words.len() {
        anyhow::bail!(MceError::SysfsWriteFailed {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "key code out of range"),
        });
    }
    if disabled {
        words[idx] |= 1 << bit;
    } else {
        words[idx] &= !(1 << bit);
    }
    let rendered = words
        .iter()
        .map(|w| format!("{w:016x}"))
        .collect::<Vec<_>>()
        .join(" ");
    fs::write(path, rendered).map_err(|source| MceError::SysfsWriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Writes "4" (enable) or "0" (disable) to `wait_for_gesture`.
pub fn set_doubletap_gesture(path: impl AsRef<Path>, enable: bool) -> Result<()> {
    write_token(path, if enable { "4" } else { "0" })
}

/// Writes "1" to `calibrate`.
pub fn recalibrate(path: impl AsRef<Path>) -> Result<()> {
    write_token(path, "1")
}

/// Writes "0"/"1" to `disable_ts`/`disable_kp` (enable/disable hardware
/// interrupt delivery).
pub fn set_hw_interrupts_disabled(path: impl AsRef<Path>, disabled: bool) -> Result<()> {
    write_token(path, if disabled { "1" } else { "0" })
}

fn write_token(path: impl AsRef<Path>, token: &str) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, token).map_err(|source| MceError::SysfsWriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Reads `palm_status`: non-zero ASCII integer means palm in contact.
pub fn read_palm_status(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading palm_status at {:?}", path))?;
    let value: i64 = content
        .trim()
        .parse()
        .with_context(|| format!("malformed palm_status content {:?}", content))?;
    Ok(value != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn set_key_disabled_round_trips_through_a_fresh_file() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "0000000000000000 0000000000000000 0000000000000000 0000000000000000 0000000000000000 0000000000000000").unwrap();
        set_key_disabled(file.path(), 116, true).unwrap(); // KEY_POWER
        let words = read_gpio_key_disable(file.path()).unwrap();
        assert_eq!(words[116 / 64] & (1 << (116 % 64)), 1 << (116 % 64));

        set_key_disabled(file.path(), 116, false).unwrap();
        let words = read_gpio_key_disable(file.path()).unwrap();
        assert_eq!(words[116 / 64] & (1 << (116 % 64)), 0);
    }

    #[test]
    fn palm_status_nonzero_means_in_contact() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "1\n").unwrap();
        assert!(read_palm_status(file.path()).unwrap());
        fs::write(file.path(), "0\n").unwrap();
        assert!(!read_palm_status(file.path()).unwrap());
    }

    #[test]
    fn doubletap_gesture_writes_expected_tokens() {
        let file = NamedTempFile::new().unwrap();
        set_doubletap_gesture(file.path(), true).unwrap();
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "4");
        set_doubletap_gesture(file.path(), false).unwrap();
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "0");
    }

    #[test]
    fn sysfs_write_failure_surfaces_as_mce_error() {
        let result = write_token(Path::new("/nonexistent/dir/node"), "1");
        assert!(result.is_err());
    }
}
