//! Post-run output integrity checks.
//!
//! A dump process killed mid-write leaves a structurally valid prefix of a
//! compressed stream, which a naive consumer would read as a short but
//! plausible dump. Every produced file is therefore verified before it is
//! renamed into place; a file that fails is renamed aside with a
//! `.truncated` suffix so later runs and the prefetch resolver skip it.
//!
//! bz2 files are checked in O(1) by locating the stream footer magic in the
//! file tail; the footer is bit-aligned, not byte-aligned, so the scan
//! tries every bit offset. gz and 7z carry no trailing magic worth trusting
//! and are decompressed to EOF through their own tools instead.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::Context;
use dumpmill_exec::{Command, ExecError, PipelineRunner};
use tracing::warn;

use crate::config::DumpConfig;
use crate::error::DumpError;

/// bz2 end-of-stream magic (sqrt(pi) digits), 48 bits.
const BZ2_FOOTER_MAGIC: u64 = 0x1772_4538_5090;

/// How much file tail to scan for the bz2 footer. The footer is followed
/// only by a 32-bit CRC and padding, so a small tail suffices.
const BZ2_TAIL_BYTES: u64 = 32 * 1024;

/// Whether a produced file decompresses cleanly.
///
/// # Errors
///
/// Returns [`DumpError::HardFailure`] when the file cannot be read or the
/// checking tool itself cannot run. A failed check is `Ok(false)`, not an
/// error.
pub async fn is_intact(
    path: &Path,
    ext: &str,
    config: &DumpConfig,
    runner: &PipelineRunner,
) -> Result<bool, DumpError> {
    match ext {
        "bz2" => bz2_is_intact(path).map_err(Into::into),
        "gz" => tool_check(runner, &config.binaries.gzip, &["-t"], path).await,
        "7z" => tool_check(runner, &config.binaries.sevenzip, &["t"], path).await,
        // Uncompressed outputs have no footer to verify.
        _ => Ok(true),
    }
}

/// Verify an `.inprog` output and publish it under its final name, or
/// quarantine it with a `.truncated` suffix.
///
/// # Errors
///
/// Returns [`DumpError::TruncationDetected`] for a quarantined file and
/// [`DumpError::HardFailure`] on I/O failure.
pub async fn verify_and_publish(
    inprog: &Path,
    final_path: &Path,
    ext: &str,
    config: &DumpConfig,
    runner: &PipelineRunner,
) -> Result<(), DumpError> {
    if is_intact(inprog, ext, config, runner).await? {
        std::fs::rename(inprog, final_path)
            .with_context(|| format!("publishing {}", final_path.display()))?;
        return Ok(());
    }
    let quarantined = truncated_name(final_path);
    warn!(
        file = %inprog.display(),
        quarantined = %quarantined.display(),
        "truncated output quarantined"
    );
    std::fs::rename(inprog, &quarantined)
        .with_context(|| format!("quarantining {}", quarantined.display()))?;
    Err(DumpError::TruncationDetected { file: quarantined })
}

fn truncated_name(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".truncated");
    PathBuf::from(name)
}

async fn tool_check(
    runner: &PipelineRunner,
    program: &str,
    args: &[&str],
    path: &Path,
) -> Result<bool, DumpError> {
    let argv: Vec<String> = args
        .iter()
        .map(|s| (*s).to_string())
        .chain(std::iter::once(path.display().to_string()))
        .collect();
    match runner.run_capture(&Command::new(program, argv)).await {
        Ok(_) => Ok(true),
        Err(ExecError::CaptureFailed { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn bz2_is_intact(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let tail_len = len.min(BZ2_TAIL_BYTES);
    file.seek(SeekFrom::End(
        -i64::try_from(tail_len).unwrap_or(i64::MAX),
    ))?;
    let mut tail = Vec::with_capacity(usize::try_from(tail_len).unwrap_or(usize::MAX));
    file.read_to_end(&mut tail)?;
    Ok(bz2_footer_present(&tail))
}

/// Scan a buffer for the 48-bit footer magic at every bit offset.
fn bz2_footer_present(buf: &[u8]) -> bool {
    let total_bits = buf.len().saturating_mul(8);
    if total_bits < 48 {
        return false;
    }
    'outer: for start in 0..=(total_bits - 48) {
        for bit in 0..48u64 {
            let want = (BZ2_FOOTER_MAGIC >> (47 - bit)) & 1;
            let pos = start + usize::try_from(bit).unwrap_or(usize::MAX);
            let got = u64::from((buf[pos / 8] >> (7 - pos % 8)) & 1);
            if want != got {
                continue 'outer;
            }
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FOOTER_BYTES: [u8; 6] = [0x17, 0x72, 0x45, 0x38, 0x50, 0x90];

    /// The footer bytes shifted right by `shift` bits, with arbitrary
    /// leading bits.
    fn shifted_footer(shift: u32) -> Vec<u8> {
        let value = u128::from(BZ2_FOOTER_MAGIC) << (72 - shift);
        let mut out = vec![0x00u8; 4];
        out.extend_from_slice(&value.to_be_bytes()[..8]);
        out.extend_from_slice(&[0x00; 4]);
        out
    }

    #[test]
    fn test_footer_found_at_byte_alignment() {
        let mut buf = vec![0u8; 100];
        buf.extend_from_slice(&FOOTER_BYTES);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert!(bz2_footer_present(&buf));
    }

    #[test]
    fn test_footer_found_at_every_bit_shift() {
        for shift in 0..8 {
            assert!(
                bz2_footer_present(&shifted_footer(shift)),
                "shift {shift}"
            );
        }
    }

    #[test]
    fn test_footer_absent_in_noise() {
        let buf = vec![0x5Cu8; 4096];
        assert!(!bz2_footer_present(&buf));
        assert!(!bz2_footer_present(&[]));
        assert!(!bz2_footer_present(&[0x17, 0x72]));
    }

    #[tokio::test]
    async fn test_empty_bz2_file_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bz2");
        std::fs::write(&path, b"").unwrap();
        let config = DumpConfig::with_roots(dir.path(), dir.path());
        let runner = PipelineRunner::new();
        assert!(!is_intact(&path, "bz2", &config, &runner).await.unwrap());
    }

    #[tokio::test]
    async fn test_gz_check_delegates_to_the_tool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.gz");
        std::fs::write(&path, b"anything").unwrap();
        let runner = PipelineRunner::new();

        let mut config = DumpConfig::with_roots(dir.path(), dir.path());
        config.binaries.gzip = "true".to_string();
        assert!(is_intact(&path, "gz", &config, &runner).await.unwrap());

        config.binaries.gzip = "false".to_string();
        assert!(!is_intact(&path, "gz", &config, &runner).await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_renames_an_intact_file() {
        let dir = TempDir::new().unwrap();
        let inprog = dir.path().join("out.bz2.inprog");
        let final_path = dir.path().join("out.bz2");
        let mut content = vec![0x42u8; 64];
        content.extend_from_slice(&FOOTER_BYTES);
        content.extend_from_slice(&[0; 4]);
        std::fs::write(&inprog, &content).unwrap();

        let config = DumpConfig::with_roots(dir.path(), dir.path());
        let runner = PipelineRunner::new();
        verify_and_publish(&inprog, &final_path, "bz2", &config, &runner)
            .await
            .unwrap();
        assert!(final_path.exists());
        assert!(!inprog.exists());
    }

    #[tokio::test]
    async fn test_truncated_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let inprog = dir.path().join("out.bz2.inprog");
        let final_path = dir.path().join("out.bz2");
        std::fs::write(&inprog, vec![0u8; 64]).unwrap();

        let config = DumpConfig::with_roots(dir.path(), dir.path());
        let runner = PipelineRunner::new();
        let err = verify_and_publish(&inprog, &final_path, "bz2", &config, &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, DumpError::TruncationDetected { .. }));
        assert!(!final_path.exists());
        assert!(dir.path().join("out.bz2.truncated").exists());
    }
}
