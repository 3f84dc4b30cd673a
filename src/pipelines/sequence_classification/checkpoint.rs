//! Selection and pruning of the per-epoch checkpoints written by the learner
//!
//! The learner's file checkpointer stores `model-<epoch>.mpk`, `optim-<epoch>.mpk` and
//! `scheduler-<epoch>.mpk` under `<artifact_dir>/checkpoint`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};

/// Record kinds written by the learner for every epoch
pub static RECORDS: &[&str] = &["model", "optim", "scheduler"];

/// The checkpoint directory inside an artifact directory
pub fn directory(artifact_dir: &str) -> PathBuf {
    Path::new(artifact_dir).join("checkpoint")
}

/// Path of a model record, without the recorder's file extension
pub fn model_path(checkpoint_dir: &Path, epoch: usize) -> PathBuf {
    checkpoint_dir.join(format!("model-{epoch}"))
}

fn parse_epoch(file_name: &str) -> Option<(&str, usize)> {
    let stem = file_name.strip_suffix(".mpk")?;
    let (kind, epoch) = stem.rsplit_once('-')?;

    Some((kind, epoch.parse().ok()?))
}

/// Epochs with a saved model record, in ascending order
pub fn list_epochs(checkpoint_dir: &Path) -> io::Result<Vec<usize>> {
    let mut epochs = BTreeSet::new();

    for entry in fs::read_dir(checkpoint_dir)? {
        let entry = entry?;
        let name = entry.file_name();

        if let Some(("model", epoch)) = name.to_str().and_then(parse_epoch) {
            epochs.insert(epoch);
        }
    }

    Ok(epochs.into_iter().collect())
}

/// The saved epoch with the highest recorded metric. Ties go to the earliest epoch; epochs
/// without a recorded value are never selected.
pub fn select_best(history: &BTreeMap<usize, f64>, available: &[usize]) -> Option<usize> {
    available
        .iter()
        .filter_map(|epoch| history.get(epoch).map(|value| (*epoch, *value)))
        .filter(|(_, value)| value.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (epoch, value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((epoch, value)),
        })
        .map(|(epoch, _)| epoch)
}

/// Delete every record that does not belong to `keep`, returning how many files were removed
pub fn retain_only(checkpoint_dir: &Path, keep: usize) -> io::Result<usize> {
    let mut removed = 0;

    for entry in fs::read_dir(checkpoint_dir)? {
        let entry = entry?;
        let name = entry.file_name();

        let Some((kind, epoch)) = name.to_str().and_then(parse_epoch) else {
            continue;
        };

        if epoch != keep && RECORDS.contains(&kind) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn touch_epochs(dir: &Path, epochs: &[usize]) {
        for epoch in epochs {
            for kind in RECORDS {
                fs::write(dir.join(format!("{kind}-{epoch}.mpk")), b"").unwrap();
            }
        }
    }

    #[test]
    fn lists_saved_epochs() {
        let dir = tempfile::tempdir().unwrap();
        touch_epochs(dir.path(), &[3, 1, 2, 10]);
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        assert_eq!(list_epochs(dir.path()).unwrap(), vec![1, 2, 3, 10]);
    }

    #[test]
    fn selects_highest_metric_not_lowest_epoch() {
        let history = BTreeMap::from([(1, 0.41), (2, 0.52), (3, 0.48)]);

        assert_eq!(select_best(&history, &[1, 2, 3]), Some(2));
    }

    #[test]
    fn ties_go_to_the_earliest_epoch() {
        let history = BTreeMap::from([(1, 0.4), (2, 0.6), (3, 0.6)]);

        assert_eq!(select_best(&history, &[1, 2, 3]), Some(2));
    }

    #[test]
    fn ignores_epochs_without_a_checkpoint_or_a_metric() {
        let history = BTreeMap::from([(1, 0.9), (2, 0.5), (4, f64::NAN)]);

        assert_eq!(select_best(&history, &[2, 3, 4]), Some(2));
        assert_eq!(select_best(&history, &[3]), None);
    }

    #[test]
    fn prunes_everything_but_the_kept_epoch() {
        let dir = tempfile::tempdir().unwrap();
        touch_epochs(dir.path(), &[1, 2, 3]);

        let removed = retain_only(dir.path(), 2).unwrap();

        assert_eq!(removed, 6);
        assert_eq!(list_epochs(dir.path()).unwrap(), vec![2]);
        assert!(dir.path().join("optim-2.mpk").exists());
        assert!(dir.path().join("scheduler-2.mpk").exists());
    }

    #[test]
    fn model_path_has_no_extension() {
        assert_eq!(
            model_path(Path::new("runs/a/checkpoint"), 4),
            PathBuf::from("runs/a/checkpoint/model-4")
        );
    }
}
