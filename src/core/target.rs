//! Robust parsing for "<manifest>:<key>[,<key>...]" with Windows support.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Songs to remove from one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalTarget
{
    /// Manifest path as provided
    pub manifest: PathBuf,
    /// Entry keys, deduplicated, in the order given
    pub keys: Vec<String>,
}

impl RemovalTarget
{
    pub fn new(
        manifest: impl Into<PathBuf>,
        keys: Vec<String>,
    ) -> Self
    {
        Self { manifest: manifest.into(), keys }
    }

    /// Parse a target string like
    /// "USRDIR/dlc/songs.dta:chump,longview" or "C:\\rb3\\songs.dta:chump".
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest path or the key list is missing.
    pub fn parse(input: &str) -> Result<Self>
    {
        let s = input.trim();

        // Split from the right once to avoid breaking "C:\..."
        let mut it = s.rsplitn(2, ':');

        let keys_str = it
            .next()
            .context("missing song key after ':'")?
            .trim();

        let path_str = it
            .next()
            .context("missing manifest path before ':'")?
            .trim();

        if path_str.is_empty()
        {
            bail!("missing manifest path in: {input}");
        }

        let mut keys: Vec<String> = Vec::new();
        for key in keys_str.split(',')
        {
            let key = key.trim();
            if key.is_empty() || keys.iter().any(|k| k == key)
            {
                continue;
            }
            keys.push(key.to_string());
        }

        if keys.is_empty()
        {
            bail!("no song keys in: {input}");
        }

        Ok(Self { manifest: PathBuf::from(path_str), keys })
    }
}

/// Fold targets naming the same manifest together, first appearance wins.
pub fn group_targets(targets: Vec<RemovalTarget>) -> Vec<RemovalTarget>
{
    let mut out: Vec<RemovalTarget> = Vec::with_capacity(targets.len());
    for t in targets
    {
        match out
            .iter_mut()
            .find(|o| o.manifest == t.manifest)
        {
            Some(existing) =>
            {
                for k in t.keys
                {
                    if !existing
                        .keys
                        .contains(&k)
                    {
                        existing
                            .keys
                            .push(k);
                    }
                }
            }
            None => out.push(t),
        }
    }
    out
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_keys()
    {
        let t = RemovalTarget::parse("dlc/songs.dta:chump, longview,chump").unwrap();
        assert_eq!(t.manifest, PathBuf::from("dlc/songs.dta"));
        assert_eq!(t.keys, vec!["chump", "longview"]);
    }

    #[test]
    fn windows_drive_letter_survives()
    {
        let t = RemovalTarget::parse(r"C:\rb3\songs.dta:chump").unwrap();
        assert_eq!(t.manifest, PathBuf::from(r"C:\rb3\songs.dta"));
        assert_eq!(t.keys, vec!["chump"]);
    }

    #[test]
    fn rejects_missing_parts()
    {
        assert!(RemovalTarget::parse("songs.dta").is_err());
        assert!(RemovalTarget::parse("songs.dta:").is_err());
        assert!(RemovalTarget::parse(":chump").is_err());
    }

    #[test]
    fn groups_by_manifest()
    {
        let grouped = group_targets(vec![
            RemovalTarget::parse("a.dta:x").unwrap(),
            RemovalTarget::parse("b.dta:y").unwrap(),
            RemovalTarget::parse("a.dta:z,x").unwrap(),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].keys, vec!["x", "z"]);
    }
}
