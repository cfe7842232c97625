use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Flags edits to kernel sources. The render loop polls the flag between
/// frames and rebuilds the program.
pub struct KernelWatcher {
    _watcher: RecommendedWatcher,
    changed: Arc<AtomicBool>,
}

impl KernelWatcher {
    /// Returns whether a kernel changed since the last call.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}

fn is_kernel_change(event: &Event) -> bool {
    (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove())
        && event
            .paths
            .iter()
            .any(|path| path.extension().is_some_and(|ext| ext == "wgsl"))
}

pub fn start(dir: &Path) -> Result<KernelWatcher> {
    let changed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&changed);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_kernel_change(&event) => {
            info!(paths = ?event.paths, "kernel source changed");
            flag.store(true, Ordering::Release);
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Error watching kernel files: {e:?}"),
    })?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("cannot watch {}", dir.display()))?;
    info!(dir = %dir.display(), "kernel watcher started");
    Ok(KernelWatcher {
        _watcher: watcher,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_wgsl_edits_count() {
        assert!(is_kernel_change(&event(
            EventKind::Modify(ModifyKind::Any),
            "kernels/render.wgsl"
        )));
        assert!(is_kernel_change(&event(
            EventKind::Create(CreateKind::File),
            "kernels/extra.wgsl"
        )));
        assert!(!is_kernel_change(&event(
            EventKind::Modify(ModifyKind::Any),
            "kernels/notes.md"
        )));
        assert!(!is_kernel_change(&event(EventKind::Any, "kernels/render.wgsl")));
    }
}
