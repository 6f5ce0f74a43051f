use crate::dir::{MAX_EXTENSION, MAX_FILENAME};
use crate::fs::FsError;

/// A request path resolved against the two-level tree shape. The tree goes
/// no deeper than root → directory → file, so any path with more components
/// simply does not exist.
#[derive(Debug, PartialEq)]
pub(crate) enum FsPath {
    Root,
    Directory(String),
    File {
        dir: String,
        name: String,
        ext: String,
    },
}

impl FsPath {
    /// Splits `/ DIRNAME [/ FILENAME [. EXTENSION]]`. The extension starts
    /// at the first dot of the file component; a name or directory over 8
    /// bytes or an extension over 3 fails with `NameTooLong`.
    pub fn parse(path: &str) -> Result<FsPath, FsError> {
        let rest = match path.strip_prefix('/') {
            Some(rest) => rest,
            None => return Err(FsError::NotFound),
        };
        if rest.is_empty() {
            return Ok(FsPath::Root);
        }

        let mut parts = rest.splitn(3, '/');
        let dir = parts.next().unwrap_or("");
        let file = parts.next();
        if parts.next().is_some() {
            // Deeper nesting than /dir/file is unsupported.
            return Err(FsError::NotFound);
        }

        if dir.is_empty() {
            return Err(FsError::NotFound);
        }
        if dir.len() > MAX_FILENAME {
            return Err(FsError::NameTooLong);
        }

        let file = match file {
            None | Some("") => return Ok(FsPath::Directory(dir.to_string())),
            Some(file) => file,
        };

        let mut pieces = file.splitn(2, '.');
        let name = pieces.next().unwrap_or("");
        let ext = pieces.next().unwrap_or("");

        if name.is_empty() {
            return Err(FsError::NotFound);
        }
        if name.len() > MAX_FILENAME || ext.len() > MAX_EXTENSION {
            return Err(FsError::NameTooLong);
        }

        Ok(FsPath::File {
            dir: dir.to_string(),
            name: name.to_string(),
            ext: ext.to_string(),
        })
    }
}
