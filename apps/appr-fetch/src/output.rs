use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

pub fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, data)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.yaml");
        write_output(Some(&path), b"packageName: etcd\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"packageName: etcd\n");
    }

    #[test]
    fn test_write_output_bad_path() {
        let err = write_output(Some(Path::new("/nonexistent/dir/blob")), b"x").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dir/blob"));
    }
}
