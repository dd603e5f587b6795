//! Static-pages publishing: commit the output tree to a branch and push it.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use git2::{
    Cred, CredentialType, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RemoteCallbacks, Repository, Signature,
};
use walkdir::WalkDir;

use crate::error::PublishError;

/// Where and how to publish.
#[derive(Debug, Clone)]
pub struct PagesConfig {
    /// Remote repository URL (ssh, https or a local path)
    pub remote: String,

    /// Hosting branch
    pub branch: String,

    /// Commit author name
    pub author_name: String,

    /// Commit author email
    pub author_email: String,

    /// Commit message
    pub message: String,

    /// Scratch repository used to assemble the commit
    pub workdir: PathBuf,

    /// Token for https remotes
    pub token: Option<String>,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            remote: String::new(),
            branch: "gh-pages".to_string(),
            author_name: "inkpress".to_string(),
            author_email: "inkpress@users.noreply.github.com".to_string(),
            message: "Updates".to_string(),
            workdir: PathBuf::from(".inkpress/pages"),
            token: None,
        }
    }
}

impl PagesConfig {
    /// URL of the `origin` remote of the repository containing `project_dir`.
    pub fn origin_url(project_dir: &Path) -> Result<String, PublishError> {
        let repo = Repository::discover(project_dir)?;
        let remote = repo.find_remote("origin")?;
        remote
            .url()
            .map(str::to_string)
            .ok_or(PublishError::MissingSetting("pages.remote"))
    }
}

/// Commits an output tree onto a hosting branch and pushes it.
pub struct PagesPublisher {
    config: PagesConfig,
}

impl PagesPublisher {
    pub fn new(config: PagesConfig) -> Self {
        Self { config }
    }

    /// Publish `output_dir`, returning the new commit id.
    ///
    /// The current tip of the remote branch, if any, becomes the parent so the
    /// push is a fast-forward. Blocking; run it on a blocking thread.
    pub fn publish(&self, output_dir: &Path) -> Result<Oid, PublishError> {
        if self.config.remote.is_empty() {
            return Err(PublishError::MissingSetting("pages.remote"));
        }
        if !output_dir.is_dir() {
            return Err(PublishError::MissingOutput(output_dir.to_path_buf()));
        }

        let workdir = &self.config.workdir;
        if workdir.exists() {
            fs::remove_dir_all(workdir).map_err(|source| PublishError::Io {
                path: workdir.clone(),
                source,
            })?;
        }
        let repo = Repository::init(workdir)?;
        let mut remote = repo.remote("origin", &self.config.remote)?;

        let branch_ref = format!("refs/heads/{}", self.config.branch);
        let tracking_ref = format!("refs/remotes/origin/{}", self.config.branch);

        self.fetch_branch(&mut remote, &branch_ref, &tracking_ref)?;
        let parent = repo
            .find_reference(&tracking_ref)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());

        let files = copy_tree(output_dir, workdir)?;
        tracing::debug!("Staged {} files in {}", files, workdir.display());

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;

        let signature = Signature::now(&self.config.author_name, &self.config.author_email)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let commit = repo.commit(
            Some(&branch_ref),
            &signature,
            &signature,
            &self.config.message,
            &tree,
            &parents,
        )?;

        self.push(&mut remote, &branch_ref)?;
        tracing::info!(
            "Pushed {} to {} ({})",
            commit,
            self.config.branch,
            self.config.remote
        );

        Ok(commit)
    }

    /// Fetch the remote branch into `tracking_ref`. A branch that does not
    /// exist yet (including on an empty remote) is not an error.
    fn fetch_branch(
        &self,
        remote: &mut git2::Remote<'_>,
        branch_ref: &str,
        tracking_ref: &str,
    ) -> Result<(), PublishError> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());

        match remote.fetch(
            &[format!("+{branch_ref}:{tracking_ref}")],
            Some(&mut options),
            None,
        ) {
            Ok(()) => Ok(()),
            Err(e) if is_missing_ref(&e) => {
                tracing::debug!("{} not on remote yet: {}", branch_ref, e.message());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn push(&self, remote: &mut git2::Remote<'_>, branch_ref: &str) -> Result<(), PublishError> {
        let rejection = RefCell::new(None);

        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[format!("{branch_ref}:{branch_ref}")], Some(&mut options))?;
        }

        match rejection.into_inner() {
            Some(message) => Err(PublishError::PushRejected {
                branch: self.config.branch.clone(),
                message,
            }),
            None => Ok(()),
        }
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let token = self.config.token.as_deref();
        let mut attempts = CredentialAttempts::default();

        callbacks.credentials(move |_url, username, allowed| {
            let username = username.unwrap_or("git");
            match attempts.next(allowed, token.is_some())? {
                CredentialKind::Username => Cred::username(username),
                CredentialKind::SshAgent => Cred::ssh_key_from_agent(username),
                CredentialKind::Token => {
                    Cred::userpass_plaintext("x-access-token", token.unwrap_or_default())
                }
                CredentialKind::Default => Cred::default(),
            }
        });
        callbacks
    }
}

fn is_missing_ref(error: &git2::Error) -> bool {
    error.code() == ErrorCode::NotFound || error.message().contains("couldn't find remote ref")
}

/// Credential to offer on one callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialKind {
    Username,
    SshAgent,
    Token,
    Default,
}

/// Offers one credential per operation; any later request fails the
/// operation. libgit2 asks again after every rejected credential.
#[derive(Debug, Default)]
struct CredentialAttempts {
    offered: bool,
}

impl CredentialAttempts {
    fn next(&mut self, allowed: CredentialType, has_token: bool) -> Result<CredentialKind, git2::Error> {
        // the username request precedes the real credential for ssh
        if allowed.contains(CredentialType::USERNAME) {
            return Ok(CredentialKind::Username);
        }
        if self.offered {
            return Err(git2::Error::from_str(
                "authentication failed: remote rejected the offered credentials",
            ));
        }
        self.offered = true;

        if allowed.contains(CredentialType::SSH_KEY) {
            Ok(CredentialKind::SshAgent)
        } else if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && has_token {
            Ok(CredentialKind::Token)
        } else {
            Ok(CredentialKind::Default)
        }
    }
}

/// Copy every file of `src` into `dst`, returning the number copied.
fn copy_tree(src: &Path, dst: &Path) -> Result<usize, PublishError> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        let io_error = |source| PublishError::Io {
            path: target.clone(),
            source,
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_error)?;
        } else {
            fs::copy(entry.path(), &target).map_err(io_error)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn output_tree(root: &Path) {
        fs::create_dir_all(root.join("static/css")).unwrap();
        fs::write(root.join("a.html"), "<h1>A</h1>").unwrap();
        fs::write(root.join("static/css/main.css"), "body{}").unwrap();
    }

    fn config(remote: &Path, workdir: &Path) -> PagesConfig {
        PagesConfig {
            remote: remote.to_string_lossy().into_owned(),
            workdir: workdir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn pushes_output_to_pages_branch() {
        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote.git");
        let output = temp.path().join("dist");
        Repository::init_bare(&remote).unwrap();
        output_tree(&output);

        let publisher = PagesPublisher::new(config(&remote, &temp.path().join("scratch")));
        let commit_id = publisher.publish(&output).unwrap();

        let repo = Repository::open_bare(&remote).unwrap();
        let commit = repo
            .find_reference("refs/heads/gh-pages")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(commit.id(), commit_id);
        assert_eq!(commit.author().name(), Some("inkpress"));
        assert_eq!(commit.message(), Some("Updates"));
        assert_eq!(commit.parent_count(), 0);

        let tree = commit.tree().unwrap();
        assert!(tree.get_path(Path::new("a.html")).is_ok());
        assert!(tree.get_path(Path::new("static/css/main.css")).is_ok());
    }

    #[test]
    fn builds_on_previous_publish() {
        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote.git");
        let output = temp.path().join("dist");
        Repository::init_bare(&remote).unwrap();
        output_tree(&output);

        let publisher = PagesPublisher::new(config(&remote, &temp.path().join("scratch")));
        let first = publisher.publish(&output).unwrap();

        fs::remove_file(output.join("a.html")).unwrap();
        fs::write(output.join("b.html"), "<h1>B</h1>").unwrap();
        let second = publisher.publish(&output).unwrap();

        let repo = Repository::open_bare(&remote).unwrap();
        let commit = repo.find_commit(second).unwrap();
        assert_eq!(commit.parent_id(0).unwrap(), first);

        let tree = commit.tree().unwrap();
        assert!(tree.get_path(Path::new("b.html")).is_ok());
        assert!(tree.get_path(Path::new("a.html")).is_err());
    }

    #[test]
    fn offers_each_credential_once() {
        let mut attempts = CredentialAttempts::default();
        assert_eq!(
            attempts.next(CredentialType::USERNAME, false).unwrap(),
            CredentialKind::Username
        );
        assert_eq!(
            attempts.next(CredentialType::SSH_KEY, false).unwrap(),
            CredentialKind::SshAgent
        );
        assert!(attempts.next(CredentialType::SSH_KEY, false).is_err());

        let mut attempts = CredentialAttempts::default();
        let allowed = CredentialType::USER_PASS_PLAINTEXT;
        assert_eq!(attempts.next(allowed, true).unwrap(), CredentialKind::Token);
        assert!(attempts.next(allowed, true).is_err());

        let mut attempts = CredentialAttempts::default();
        assert_eq!(attempts.next(allowed, false).unwrap(), CredentialKind::Default);
    }

    #[test]
    fn recognises_missing_remote_refs() {
        let missing = git2::Error::new(
            ErrorCode::NotFound,
            git2::ErrorClass::Reference,
            "couldn't find remote ref refs/heads/gh-pages",
        );
        let other = git2::Error::from_str("connection refused");

        assert!(is_missing_ref(&missing));
        assert!(!is_missing_ref(&other));
    }

    #[test]
    fn requires_remote_and_output() {
        let temp = tempdir().unwrap();

        let publisher = PagesPublisher::new(PagesConfig::default());
        assert!(matches!(
            publisher.publish(temp.path()),
            Err(PublishError::MissingSetting("pages.remote"))
        ));

        let publisher = PagesPublisher::new(config(temp.path(), &temp.path().join("scratch")));
        assert!(matches!(
            publisher.publish(&temp.path().join("dist")),
            Err(PublishError::MissingOutput(_))
        ));
    }
}
