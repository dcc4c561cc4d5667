//! Explains why creating a link was refused

use std::io;

/// `ERROR_PRIVILEGE_NOT_HELD`
const WINDOWS_PRIVILEGE_NOT_HELD: i32 = 1314;

/// Whether an OS error means symlink creation was not permitted
#[must_use]
pub fn is_privilege_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || err.raw_os_error() == Some(WINDOWS_PRIVILEGE_NOT_HELD)
}

/// What we could find out about the current process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeProbe {
    pub elevated: bool,
    /// `None` where the concept doesn't exist (non-Windows)
    pub developer_mode: Option<bool>,
    /// Effective user, where it can be resolved (unix)
    pub user: Option<String>,
}

impl PrivilegeProbe {
    #[must_use]
    pub fn current() -> Self {
        Self {
            elevated: is_elevated(),
            developer_mode: developer_mode_enabled(),
            user: effective_user(),
        }
    }

    /// Guidance naming the actual cause
    #[must_use]
    pub fn diagnose(&self, err: &io::Error) -> String {
        match (self.elevated, self.developer_mode) {
            (false, Some(false)) => format!(
                "Symbolic link creation was denied ({err}): not running as administrator and Developer Mode is disabled.\n\n\
                 SOLUTION - You have two options:\n\n\
                 Option 1: Run as Administrator\n  \
                 1. Close this terminal\n  \
                 2. Right-click on PowerShell (or Command Prompt) and select 'Run as Administrator'\n  \
                 3. Re-run this tool with --skip-download --skip-extract --skip-first-run\n\n\
                 Option 2: Enable Developer Mode (Windows 10/11)\n  \
                 1. Open Settings -> Privacy & security -> For developers\n  \
                 2. Enable 'Developer Mode'\n  \
                 3. Re-run this tool (no admin rights needed)"
            ),
            (false, Some(true)) => format!(
                "Symbolic link creation was denied ({err}) even though Developer Mode is enabled.\n\
                 Not running as administrator: re-run from an elevated terminal with \
                 --skip-download --skip-extract --skip-first-run"
            ),
            (true, Some(_)) => format!(
                "Symbolic link creation was denied ({err}) while running as administrator.\n\
                 The target drive may not support symbolic links (FAT32/exFAT or a network share)"
            ),
            (elevated, None) => {
                let role = if elevated { "root" } else { "an unprivileged user" };
                let who = self
                    .user
                    .as_deref()
                    .map_or_else(|| role.to_string(), |name| format!("user '{name}' ({role})"));
                format!(
                    "Permission denied creating the link ({err}) as {who}.\n\
                     Check write permissions on the parent directory of the models folder"
                )
            }
        }
    }
}

#[cfg(unix)]
fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(windows)]
fn is_elevated() -> bool {
    // `net session` only succeeds from an elevated process
    std::process::Command::new("net")
        .arg("session")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

#[cfg(not(any(unix, windows)))]
const fn is_elevated() -> bool {
    false
}

/// Name of the effective user, falling back to the numeric uid
#[cfg(unix)]
fn effective_user() -> Option<String> {
    let uid = nix::unistd::geteuid();
    let name = nix::unistd::User::from_uid(uid)
        .ok()
        .flatten()
        .map_or_else(|| format!("uid {uid}"), |user| user.name);
    Some(name)
}

#[cfg(not(unix))]
const fn effective_user() -> Option<String> {
    None
}

#[cfg(windows)]
fn developer_mode_enabled() -> Option<bool> {
    let output = std::process::Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\AppModelUnlock",
            "/v",
            "AllowDevelopmentWithoutDevLicense",
        ])
        .output()
        .ok()?;
    if !output.status.success() {
        return Some(false);
    }
    Some(parse_reg_dword(&String::from_utf8_lossy(&output.stdout)) == Some(1))
}

#[cfg(not(windows))]
const fn developer_mode_enabled() -> Option<bool> {
    None
}

/// Value of the first `REG_DWORD` line in `reg query` output
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_reg_dword(output: &str) -> Option<u32> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let _name = parts.next()?;
        if parts.next()? != "REG_DWORD" {
            return None;
        }
        let value = parts.next()?;
        u32::from_str_radix(value.trim_start_matches("0x"), 16).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> io::Error {
        io::Error::from(io::ErrorKind::PermissionDenied)
    }

    #[test]
    fn test_is_privilege_error() {
        assert!(is_privilege_error(&denied()));
        assert!(is_privilege_error(&io::Error::from_raw_os_error(1314)));
        assert!(!is_privilege_error(&io::Error::from(io::ErrorKind::NotFound)));
    }

    #[test]
    fn test_diagnose_distinguishes_admin_from_developer_mode() {
        let neither = PrivilegeProbe {
            elevated: false,
            developer_mode: Some(false),
            user: None,
        }
        .diagnose(&denied());
        assert!(neither.contains("not running as administrator"));
        assert!(neither.contains("Developer Mode is disabled"));

        let dev_mode_on = PrivilegeProbe {
            elevated: false,
            developer_mode: Some(true),
            user: None,
        }
        .diagnose(&denied());
        assert!(dev_mode_on.contains("Developer Mode is enabled"));
        assert!(dev_mode_on.contains("Not running as administrator"));

        let admin = PrivilegeProbe {
            elevated: true,
            developer_mode: Some(false),
            user: None,
        }
        .diagnose(&denied());
        assert!(admin.contains("while running as administrator"));
    }

    #[test]
    fn test_diagnose_unix() {
        let text = PrivilegeProbe {
            elevated: false,
            developer_mode: None,
            user: Some("alice".to_string()),
        }
        .diagnose(&denied());
        assert!(text.contains("user 'alice' (an unprivileged user)"));

        let unnamed = PrivilegeProbe {
            elevated: true,
            developer_mode: None,
            user: None,
        }
        .diagnose(&denied());
        assert!(unnamed.contains("as root"));
    }

    #[cfg(unix)]
    #[test]
    fn test_current_names_effective_user() {
        let probe = PrivilegeProbe::current();
        let user = probe.user.clone().unwrap();
        assert!(!user.is_empty());
        assert!(probe.diagnose(&denied()).contains(&user));
    }

    #[test]
    fn test_parse_reg_dword() {
        let output = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\AppModelUnlock\r\n    AllowDevelopmentWithoutDevLicense    REG_DWORD    0x1\r\n";
        assert_eq!(parse_reg_dword(output), Some(1));
        assert_eq!(parse_reg_dword("nothing here"), None);
    }
}
