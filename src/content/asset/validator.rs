//! 资源完整性校验
//!
//! 通过文件头魔数和最小体积判断缓存文件是否损坏（下载中断、存储故障等）。
//! 校验只针对已知扩展名，未知扩展名直接放行。

use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// 覆盖最长魔数检查所需的文件头长度
pub const HEADER_LEN: usize = 12;

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// 已知格式的魔数
enum Signature {
    /// offset 0 处的固定字节
    Prefix(&'static [&'static [u8]]),
    /// RIFF 容器：offset 0 为 `RIFF`，offset 8 为格式标签
    Riff(&'static [u8]),
    /// ISO BMFF：offset 4 为 `ftyp`
    Ftyp,
    /// MPEG 音频：ID3 标签或帧同步
    Mpeg,
}

fn signature_for(ext: &str) -> Option<Signature> {
    match ext {
        "webp" => Some(Signature::Riff(b"WEBP")),
        "wav" => Some(Signature::Riff(b"WAVE")),
        "png" => Some(Signature::Prefix(&[&[
            0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A,
        ]])),
        "jpg" | "jpeg" => Some(Signature::Prefix(&[&[0xFF, 0xD8, 0xFF]])),
        "gif" => Some(Signature::Prefix(&[b"GIF87a", b"GIF89a"])),
        "m4a" | "mp4" => Some(Signature::Ftyp),
        "mp3" => Some(Signature::Mpeg),
        _ => None,
    }
}

fn matches_signature(sig: &Signature, header: &[u8]) -> bool {
    match sig {
        Signature::Prefix(options) => options.iter().any(|magic| header.starts_with(magic)),
        Signature::Riff(tag) => {
            header.len() >= HEADER_LEN && &header[0..4] == b"RIFF" && &header[8..12] == *tag
        }
        Signature::Ftyp => header.len() >= 8 && &header[4..8] == b"ftyp",
        Signature::Mpeg => {
            header.starts_with(b"ID3")
                || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
        }
    }
}

/// 完整性校验器
#[derive(Debug, Clone)]
pub struct IntegrityValidator {
    min_bytes: u64,
}

impl IntegrityValidator {
    pub fn new(min_bytes: u64) -> Self {
        Self { min_bytes }
    }

    /// 纯函数版本：根据扩展名、文件大小和文件头判断
    pub fn check(&self, ext: Option<&str>, size: u64, header: &[u8]) -> ValidationResult {
        if size == 0 {
            return ValidationResult::invalid("空文件");
        }
        let Some(sig) = ext.and_then(signature_for) else {
            return ValidationResult::ok();
        };
        if size < self.min_bytes {
            return ValidationResult::invalid(format!(
                "文件过小: {} 字节 < {} 字节",
                size, self.min_bytes
            ));
        }
        if !matches_signature(&sig, header) {
            return ValidationResult::invalid(format!(
                "文件头与 .{} 格式不符",
                ext.unwrap_or_default()
            ));
        }
        ValidationResult::ok()
    }

    /// 校验本地文件，`ext` 取自资源逻辑路径（小写）
    pub async fn validate(&self, local_path: &Path, ext: Option<&str>) -> ValidationResult {
        let metadata = match tokio::fs::metadata(local_path).await {
            Ok(m) => m,
            Err(e) => return ValidationResult::invalid(format!("无法读取文件信息: {}", e)),
        };
        if !metadata.is_file() {
            return ValidationResult::invalid("不是普通文件");
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        let read = match tokio::fs::File::open(local_path).await {
            Ok(file) => file.take(HEADER_LEN as u64).read_to_end(&mut header).await,
            Err(e) => Err(e),
        };
        if let Err(e) = read {
            return ValidationResult::invalid(format!("无法读取文件头: {}", e));
        }

        let result = self.check(ext, metadata.len(), &header);
        if !result.valid {
            debug!(
                "[Validator] 校验失败 {}: {:?}",
                local_path.display(),
                result.reason
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::testing::{jpeg_bytes, png_bytes, webp_bytes};

    fn validator() -> IntegrityValidator {
        IntegrityValidator::new(100)
    }

    #[test]
    fn accepts_known_signatures() {
        let v = validator();
        for (ext, bytes) in [
            ("webp", webp_bytes()),
            ("png", png_bytes()),
            ("jpg", jpeg_bytes()),
            ("jpeg", jpeg_bytes()),
        ] {
            let r = v.check(Some(ext), bytes.len() as u64, &bytes[..HEADER_LEN]);
            assert!(r.valid, "{} should be valid: {:?}", ext, r.reason);
        }
    }

    #[test]
    fn rejects_wrong_magic_and_small_files() {
        let v = validator();
        let png = png_bytes();
        let r = v.check(Some("webp"), png.len() as u64, &png[..HEADER_LEN]);
        assert!(!r.valid);

        // RIFF 容器但格式标签不对
        let mut wav_as_webp = webp_bytes();
        wav_as_webp[8..12].copy_from_slice(b"WAVE");
        assert!(!v.check(Some("webp"), 200, &wav_as_webp[..HEADER_LEN]).valid);
        assert!(v.check(Some("wav"), 200, &wav_as_webp[..HEADER_LEN]).valid);

        let r = v.check(Some("png"), 40, &png[..HEADER_LEN]);
        assert!(!r.valid);
        assert!(r.reason.unwrap().contains("过小"));
    }

    #[test]
    fn unknown_extensions_pass_but_empty_files_never_do() {
        let v = validator();
        assert!(v.check(Some("json"), 3, b"{}\n").valid);
        assert!(v.check(None, 3, b"abc").valid);
        assert!(!v.check(Some("json"), 0, b"").valid);
    }

    #[test]
    fn audio_signatures() {
        let v = validator();
        assert!(v.check(Some("mp3"), 500, b"ID3\x04\x00\x00\x00\x00\x00\x00\x00\x00").valid);
        assert!(v.check(Some("mp3"), 500, &[0xFF, 0xFB, 0x90, 0x00]).valid);
        assert!(!v.check(Some("mp3"), 500, b"<html>oops").valid);
        assert!(v.check(Some("m4a"), 500, b"\x00\x00\x00\x20ftypM4A ").valid);
    }

    #[tokio::test]
    async fn validates_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("cover.webp");
        let zero = dir.path().join("zero.png");
        let html = dir.path().join("page.PNG");
        tokio::fs::write(&good, webp_bytes()).await.unwrap();
        tokio::fs::write(&zero, b"").await.unwrap();
        tokio::fs::write(&html, vec![b'<'; 300]).await.unwrap();

        let v = validator();
        assert!(v.validate(&good, Some("webp")).await.valid);
        assert!(!v.validate(&zero, Some("png")).await.valid);
        assert!(!v.validate(&html, Some("png")).await.valid);
        assert!(!v.validate(&dir.path().join("missing.png"), Some("png")).await.valid);
        // 未知扩展名只要非空就放行
        assert!(v.validate(&html, None).await.valid);
    }
}
