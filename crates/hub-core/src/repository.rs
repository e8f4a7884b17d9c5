use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use hub_domain::{DeployError, PluginChannel, PluginNode};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

/// Index file each channel directory keeps next to its artifacts.
pub const INDEX_FILE_NAME: &str = "index.json";

type Index = BTreeMap<(String, String), PluginNode>;

/// Artifact store and index for one channel.
///
/// Artifact bytes are produced outside the index lock; the rename into the
/// channel directory and the index rewrite happen under it, so two pushes to
/// the same key cannot interleave bytes and metadata.
pub struct ChannelRepository {
    channel: PluginChannel,
    root: PathBuf,
    index: Mutex<Index>,
}

impl ChannelRepository {
    /// Opens the repository directory for `channel` under `parent`, creating
    /// it if needed and loading any persisted index.
    pub fn open(channel: PluginChannel, parent: &Path) -> Result<Self> {
        let root = parent.join(channel.dir_name());
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create channel directory {}", root.display()))?;
        let index = load_index(&root)?;
        Ok(ChannelRepository {
            channel,
            root,
            index: Mutex::new(index),
        })
    }

    pub fn channel(&self) -> PluginChannel {
        self.channel
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores an artifact and its index entry.
    ///
    /// `writer` produces the artifact bytes at a staging path inside the
    /// channel directory. On success the node carries the stored location and
    /// content hash, and the index maps `(id, platform_version)` to it. A
    /// later push with the same key replaces the earlier entry.
    pub fn push(
        &self,
        node: &mut PluginNode,
        extension: &str,
        writer: impl FnOnce(&Path) -> Result<()>,
    ) -> Result<(), DeployError> {
        let file_name = node.artifact_file_name(extension);
        let staged = NamedTempFile::new_in(&self.root).map_err(|err| {
            storage_write(
                &file_name,
                anyhow::Error::new(err).context("failed to create staging file"),
            )
        })?;

        writer(staged.path()).map_err(|err| storage_write(&file_name, err))?;
        let sha256 = compute_sha256(staged.path()).map_err(|err| storage_write(&file_name, err))?;

        let target = self.root.join(&file_name);
        let mut index = self.lock_index();
        persist_temp_file(staged, &target).map_err(|err| storage_write(&file_name, err))?;

        node.target_file = Some(target);
        node.sha256 = Some(sha256);

        let mut next = index.clone();
        next.insert(node.index_key(), node.clone());
        persist_index(&self.root, &next).map_err(|err| storage_write(&file_name, err))?;
        *index = next;

        tracing::debug!("stored {} on {}", file_name, self.channel);
        Ok(())
    }

    /// Returns the stored node for `(id, platform_version)`.
    ///
    /// Unapproved nodes stay hidden unless `allow_unapproved` is set.
    pub fn select(
        &self,
        platform_version: &str,
        id: &str,
        allow_unapproved: bool,
    ) -> Option<PluginNode> {
        let index = self.lock_index();
        let node = index.get(&(id.to_string(), platform_version.to_string()))?;
        if !node.approved && !allow_unapproved {
            return None;
        }
        Some(node.clone())
    }

    /// Snapshot of every stored node, in key order.
    pub fn nodes(&self) -> Vec<PluginNode> {
        self.lock_index().values().cloned().collect()
    }

    fn lock_index(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn storage_write(key: &str, source: anyhow::Error) -> DeployError {
    DeployError::StorageWrite {
        key: key.to_string(),
        source,
    }
}

fn load_index(root: &Path) -> Result<Index> {
    let path = root.join(INDEX_FILE_NAME);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Index::new()),
        Err(err) => {
            return Err(
                anyhow::Error::new(err).context(format!("failed to read {}", path.display()))
            )
        }
    };
    let nodes: Vec<PluginNode> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(nodes
        .into_iter()
        .map(|node| (node.index_key(), node))
        .collect())
}

fn persist_index(root: &Path, index: &Index) -> Result<()> {
    let nodes: Vec<&PluginNode> = index.values().collect();
    let rendered = serde_json::to_string_pretty(&nodes).context("failed to render index")?;
    let mut staged =
        NamedTempFile::new_in(root).context("failed to create index staging file")?;
    staged
        .write_all(rendered.as_bytes())
        .and_then(|()| staged.write_all(b"\n"))
        .context("failed to write index")?;
    persist_temp_file(staged, &root.join(INDEX_FILE_NAME))
}

fn persist_temp_file(staged: NamedTempFile, target: &Path) -> Result<()> {
    if let Err(err) = staged.persist(target) {
        // Cross-device staging cannot rename; fall back to a copy.
        if err.error.raw_os_error() == Some(18) {
            fs::copy(err.file.path(), target)
                .with_context(|| format!("failed to copy into {}", target.display()))?;
            return Ok(());
        }
        return Err(anyhow::Error::new(err.error)
            .context(format!("failed to move staged file into {}", target.display())));
    }
    Ok(())
}

fn compute_sha256(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use hub_domain::{DeployError, PluginChannel, PluginNode};
    use sha2::{Digest, Sha256};

    use super::{ChannelRepository, INDEX_FILE_NAME};

    fn write_bytes(bytes: &'static [u8]) -> impl FnOnce(&std::path::Path) -> anyhow::Result<()> {
        move |path| {
            fs::write(path, bytes)?;
            Ok(())
        }
    }

    #[test]
    fn push_then_select_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");

        let mut node = PluginNode::new("org.example", "1.0", "1554");
        repo.push(&mut node, "zip", write_bytes(b"artifact-bytes"))
            .expect("push succeeds");

        let found = repo
            .select("1554", "org.example", false)
            .expect("node is selectable");
        assert_eq!(found, node);

        let stored = found.target_file.expect("artifact location recorded");
        assert_eq!(fs::read(&stored).expect("artifact readable"), b"artifact-bytes");
        assert_eq!(
            found.sha256.expect("hash recorded"),
            hex::encode(Sha256::digest(b"artifact-bytes"))
        );
    }

    #[test]
    fn select_misses_on_unknown_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");
        assert!(repo.select("1554", "org.example", true).is_none());
    }

    #[test]
    fn same_key_push_replaces_previous_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");

        let mut old = PluginNode::new("org.example", "1.0", "1554");
        repo.push(&mut old, "zip", write_bytes(b"old")).expect("push");
        let mut new = PluginNode::new("org.example", "1.1", "1554");
        repo.push(&mut new, "zip", write_bytes(b"new")).expect("push");

        let found = repo.select("1554", "org.example", false).expect("selectable");
        assert_eq!(found.version, "1.1");
        assert_eq!(repo.nodes().len(), 1, "index keeps one entry per key");
    }

    #[test]
    fn unapproved_nodes_hide_unless_allowed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");

        let mut node = PluginNode::new("org.example", "1.0", "1554");
        node.approved = false;
        repo.push(&mut node, "zip", write_bytes(b"bytes")).expect("push");

        assert!(repo.select("1554", "org.example", false).is_none());
        let found = repo
            .select("1554", "org.example", true)
            .expect("visible when unapproved allowed");
        assert!(!found.approved);
    }

    #[test]
    fn reopen_reads_the_persisted_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let repo = ChannelRepository::open(PluginChannel::Beta, dir.path()).expect("opens");
            let mut node = PluginNode::new("org.example", "2.0", "1554");
            repo.push(&mut node, "zip", write_bytes(b"bytes")).expect("push");
        }

        let reopened = ChannelRepository::open(PluginChannel::Beta, dir.path()).expect("reopens");
        let found = reopened
            .select("1554", "org.example", false)
            .expect("index survives reopen");
        assert!(found.target_file.expect("location survives").exists());
    }

    #[test]
    fn nodes_come_back_in_key_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");

        for id in ["org.b", "org.a", "org.c"] {
            let mut node = PluginNode::new(id, "1.0", "1554");
            repo.push(&mut node, "zip", write_bytes(b"bytes")).expect("push");
        }

        let ids: Vec<String> = repo.nodes().into_iter().map(|node| node.id).collect();
        assert_eq!(ids, ["org.a", "org.b", "org.c"]);
    }

    #[test]
    fn writer_failure_leaves_no_entry_and_no_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");

        let mut node = PluginNode::new("org.example", "1.0", "1554");
        let err = repo
            .push(&mut node, "zip", |_| anyhow::bail!("writer exploded"))
            .expect_err("push must fail");
        assert!(matches!(err, DeployError::StorageWrite { key, .. } if key == "org.example_1.0.zip"));

        assert!(repo.select("1554", "org.example", true).is_none());
        let leftovers: Vec<_> = fs::read_dir(repo.root())
            .expect("channel dir readable")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name() != INDEX_FILE_NAME)
            .collect();
        assert!(leftovers.is_empty(), "staging must not leak: {leftovers:?}");
    }

    #[test]
    fn concurrent_pushes_with_distinct_keys_all_land() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = ChannelRepository::open(PluginChannel::Nightly, dir.path()).expect("opens");

        std::thread::scope(|threads| {
            for i in 0..8 {
                let repo = &repo;
                threads.spawn(move || {
                    let id = format!("org.plugin{i}");
                    let mut node = PluginNode::new(id, "1.0", "1554");
                    repo.push(&mut node, "zip", write_bytes(b"bytes")).expect("push");
                });
            }
        });

        assert_eq!(repo.nodes().len(), 8);
        for i in 0..8 {
            let id = format!("org.plugin{i}");
            let node = repo.select("1554", &id, false).expect("selectable");
            assert_eq!(node.id, id, "entries must not mix between keys");
        }
    }
}
