use serde::{Deserialize, Serialize};

use crate::core::error::{LauncherError, LauncherResult};

const LATEST_FOLDER: &str = "latest";

/// A selectable game version of one branch.
///
/// `is_latest` marks the synthetic entry that aliases the newest discovered
/// artifact; it installs into its own `latest` folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersion {
    pub display_name: String,
    pub artifact_id: u32,
    pub branch: String,
    pub is_latest: bool,
}

impl GameVersion {
    pub fn numbered(branch: impl Into<String>, artifact_id: u32) -> Self {
        Self {
            display_name: format!("Version {artifact_id}"),
            artifact_id,
            branch: branch.into(),
            is_latest: false,
        }
    }

    pub fn latest(branch: impl Into<String>, artifact_id: u32) -> Self {
        Self {
            display_name: "Latest".to_string(),
            artifact_id,
            branch: branch.into(),
            is_latest: true,
        }
    }

    /// Remote and cached file name of the patch container.
    pub fn artifact_file(&self) -> String {
        format!("{}.pwr", self.artifact_id)
    }

    pub fn folder_name(&self) -> String {
        if self.is_latest {
            LATEST_FOLDER.to_string()
        } else {
            self.artifact_id.to_string()
        }
    }

    /// `"latest"` selects the synthetic entry, a number selects that
    /// artifact's own folder.
    pub fn matches_selector(&self, selector: &str) -> bool {
        let selector = selector.trim();
        if selector.eq_ignore_ascii_case(LATEST_FOLDER) {
            return self.is_latest;
        }
        !self.is_latest && selector.parse::<u32>().ok() == Some(self.artifact_id)
    }
}

impl std::fmt::Display for GameVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Branch names end up in URLs and directory names.
pub fn validate_branch(branch: &str) -> LauncherResult<()> {
    let valid = !branch.is_empty()
        && branch.len() <= 64
        && branch
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LauncherError::InvalidBranch(branch.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_names() {
        assert_eq!(GameVersion::numbered("release", 12).folder_name(), "12");
        assert_eq!(GameVersion::latest("release", 12).folder_name(), "latest");
        assert_eq!(GameVersion::latest("release", 12).artifact_file(), "12.pwr");
    }

    #[test]
    fn selectors() {
        let latest = GameVersion::latest("beta", 3);
        let third = GameVersion::numbered("beta", 3);
        assert!(latest.matches_selector("Latest"));
        assert!(!latest.matches_selector("3"));
        assert!(third.matches_selector(" 3 "));
        assert!(!third.matches_selector("latest"));
    }

    #[test]
    fn branch_names() {
        for ok in ["release", "pre-release", "beta", "alpha", "qa_2"] {
            assert!(validate_branch(ok).is_ok(), "{ok}");
        }
        for bad in ["", "../etc", "Release", "a/b", "beta ", "x\\y"] {
            assert!(
                matches!(validate_branch(bad), Err(LauncherError::InvalidBranch(_))),
                "{bad}"
            );
        }
    }
}
