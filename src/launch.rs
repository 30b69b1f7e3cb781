//! Detached helper processes (URL browser)

use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

/// Starts an external command without waiting for it
pub trait Launcher {
    fn launch(&mut self, argv: &[String]);
}

/// Browser command line with the URL appended as a single argument
pub fn browser_argv(browser: &str, url: &str) -> Option<Vec<String>> {
    let mut argv = match shell_words::split(browser) {
        Ok(argv) => argv,
        Err(e) => {
            warn!("Cannot parse browser command {:?}: {}", browser, e);
            return None;
        }
    };
    if argv.is_empty() {
        warn!("No browser command configured");
        return None;
    }
    argv.push(url.to_string());
    Some(argv)
}

/// Runs commands as detached child processes
#[derive(Debug, Default)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&mut self, argv: &[String]) {
        let Some((program, args)) = argv.split_first() else {
            warn!("Nothing to launch");
            return;
        };

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                debug!("Launched {:?} (pid {})", argv, child.id());
                // Reap it so it does not linger as a zombie
                thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!("Failed to launch {:?}: {}", argv, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wait_for(path: &std::path::Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn browser_argv_keeps_quoted_program_whole() {
        assert_eq!(
            browser_argv("\"/opt/My Browser/firefox\" --new-tab", "https://example.com/a b"),
            Some(vec![
                "/opt/My Browser/firefox".to_string(),
                "--new-tab".to_string(),
                "https://example.com/a b".to_string(),
            ])
        );
        assert_eq!(
            browser_argv("xdg-open", "http://x"),
            Some(vec!["xdg-open".to_string(), "http://x".to_string()])
        );
    }

    #[test]
    fn browser_argv_rejects_empty_or_unbalanced() {
        assert_eq!(browser_argv("   ", "http://x"), None);
        assert_eq!(browser_argv("\"firefox", "http://x"), None);
    }

    #[cfg(unix)]
    #[test]
    fn launch_failures_are_not_fatal() {
        let mut launcher = CommandLauncher;
        launcher.launch(&[]);
        launcher.launch(&["/nonexistent/tabterm-browser".to_string(), "http://example.com".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn launches_with_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("opened");
        CommandLauncher.launch(&["touch".to_string(), marker.display().to_string()]);
        assert!(wait_for(&marker), "launched command never ran");
    }

    #[cfg(unix)]
    #[test]
    fn quoted_argument_reaches_program_intact() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("has space");
        std::fs::create_dir(&nested).unwrap();
        let marker = nested.join("opened");

        let argv = browser_argv("touch", &marker.display().to_string()).unwrap();
        CommandLauncher.launch(&argv);
        assert!(wait_for(&marker), "argument with a space was split");
    }
}
