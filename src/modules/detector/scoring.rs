//! 候选项合并与评分

use std::collections::HashSet;
use std::path::PathBuf;

use super::models::{CompletenessTier, InstallationCandidate};
use crate::modules::common::utils;

/// 每次合并带来的佐证加分
pub const CORROBORATION_BONUS: u32 = 10;
/// 仅由文件系统发现的候选项起始分
pub const FILESYSTEM_BASE_SCORE: u8 = 70;

const INSTALL_LOCATION_POINTS: u32 = 30;
const UNINSTALL_COMMAND_POINTS: u32 = 30;
const VERSION_POINTS: u32 = 20;
const INSTALL_DATE_POINTS: u32 = 10;
const ADDITIONAL_PATH_POINTS: u32 = 5;
const REGISTRY_KEY_POINTS: u32 = 5;
const VERIFIED_UNINSTALLER_POINTS: u32 = 10;

/// 证据分（只加不减，与顺序无关）
pub fn evidence_points(candidate: &InstallationCandidate) -> u32 {
    let mut points = 0;

    if candidate.has_install_path() {
        points += INSTALL_LOCATION_POINTS;
    }
    if candidate.uninstall_str().is_some() {
        points += UNINSTALL_COMMAND_POINTS;
    }
    if candidate
        .version_str()
        .and_then(utils::parse_version)
        .is_some()
    {
        points += VERSION_POINTS;
    }
    if candidate.install_date.is_some() {
        points += INSTALL_DATE_POINTS;
    }
    if !candidate.additional_paths.is_empty() {
        points += ADDITIONAL_PATH_POINTS;
    }
    if !candidate.registry_keys.is_empty() {
        points += REGISTRY_KEY_POINTS;
    }
    if candidate.uninstaller_verified {
        points += VERIFIED_UNINSTALLER_POINTS;
    }

    points
}

/// 计算最终分数并确定等级
///
/// 分数 = 起始分 + 合并佐证分 + 证据分，截断到 100。已有分数只会被抬高。
pub fn finalize(candidate: &mut InstallationCandidate) {
    let total = candidate.base_score as u32
        + candidate.corroborations * CORROBORATION_BONUS
        + evidence_points(candidate);
    let score = total.min(100) as u8;

    candidate.score = candidate.score.max(score);
    candidate.tier = CompletenessTier::from_score(candidate.score);
}

fn version_key(candidate: &InstallationCandidate) -> Option<String> {
    candidate.version_str().map(|v| v.to_ascii_lowercase())
}

fn install_key(candidate: &InstallationCandidate) -> Option<String> {
    candidate
        .install_path
        .as_ref()
        .filter(|_| candidate.has_install_path())
        .map(|p| utils::path_key(&p.to_string_lossy()))
}

/// 指向同一安装的一组候选项：版本号相同或安装位置相同即视为同一安装，
/// 组内记录出现过的所有版本和安装位置
struct MergeGroup {
    members: Vec<InstallationCandidate>,
    versions: HashSet<String>,
    paths: HashSet<String>,
}

impl MergeGroup {
    fn new(candidate: InstallationCandidate) -> Self {
        let mut group = Self {
            members: Vec::new(),
            versions: HashSet::new(),
            paths: HashSet::new(),
        };
        group.versions.extend(version_key(&candidate));
        group.paths.extend(install_key(&candidate));
        group.members.push(candidate);
        group
    }

    fn overlaps(&self, other: &MergeGroup) -> bool {
        !self.versions.is_disjoint(&other.versions) || !self.paths.is_disjoint(&other.paths)
    }

    fn absorb(&mut self, other: MergeGroup) {
        self.versions.extend(other.versions);
        self.paths.extend(other.paths);
        self.members.extend(other.members);
    }

    /// 按检测方式优先级选出保留者，其余依次并入
    fn collapse(mut self) -> Option<InstallationCandidate> {
        self.members.sort_by_key(|c| c.method.priority());
        let mut members = self.members.into_iter();
        let mut survivor = members.next()?;
        for other in members {
            merge_into(&mut survivor, other);
        }
        Some(survivor)
    }
}

/// 把 `other` 合并进 `survivor`
///
/// 证据取并集，缺失字段由 `other` 补齐；冲突时保留 `survivor` 的值（调用方保证
/// survivor 来自优先级更高的检测方式）。起始分取较大者，并记一次佐证。
pub fn merge_into(survivor: &mut InstallationCandidate, other: InstallationCandidate) {
    if survivor.version_str().is_none() {
        survivor.version = other.version.clone();
    } else if let (Some(mine), Some(theirs)) = (survivor.version_str(), other.version_str()) {
        if !mine.eq_ignore_ascii_case(theirs) {
            tracing::debug!(
                "合并时版本冲突，保留 {} (丢弃 {})",
                mine,
                theirs
            );
        }
    }

    if !survivor.has_install_path() {
        survivor.install_path = other.install_path.clone();
    }
    if survivor.uninstall_str().is_none() {
        survivor.uninstall_command = other.uninstall_command.clone();
    }
    if survivor.install_date.is_none() {
        survivor.install_date = other.install_date.clone();
    }
    survivor.estimated_size = survivor.estimated_size.max(other.estimated_size);
    survivor.uninstaller_verified |= other.uninstaller_verified;

    union_paths(&mut survivor.additional_paths, other.additional_paths);
    union_keys(&mut survivor.registry_keys, other.registry_keys);

    survivor.base_score = survivor.base_score.max(other.base_score);
    survivor.corroborations += 1 + other.corroborations;
    survivor.score = survivor.score.max(other.score);
}

fn union_paths(target: &mut Vec<PathBuf>, incoming: Vec<PathBuf>) {
    let mut seen: HashSet<String> = target
        .iter()
        .map(|p| utils::path_key(&p.to_string_lossy()))
        .collect();
    for path in incoming {
        if seen.insert(utils::path_key(&path.to_string_lossy())) {
            target.push(path);
        }
    }
}

fn union_keys(target: &mut Vec<String>, incoming: Vec<String>) {
    let mut seen: HashSet<String> = target.iter().map(|k| k.to_lowercase()).collect();
    for key in incoming {
        if seen.insert(key.to_lowercase()) {
            target.push(key);
        }
    }
}

/// 合并指向同一安装的候选项
///
/// 版本或安装位置与组内任一成员相同即并入该组，新成员可能把几个组连成一组，
/// 因此结果与输入顺序无关。
pub fn merge_candidates(candidates: Vec<InstallationCandidate>) -> Vec<InstallationCandidate> {
    let mut groups: Vec<MergeGroup> = Vec::new();

    for candidate in candidates {
        let mut group = MergeGroup::new(candidate);
        // 已有的组两两不相交，新组吸收一个组后不会与之前检查过的组产生新的交集
        let mut index = 0;
        while index < groups.len() {
            if groups[index].overlaps(&group) {
                let existing = groups.remove(index);
                group.absorb(existing);
            } else {
                index += 1;
            }
        }
        groups.push(group);
    }

    groups.into_iter().filter_map(MergeGroup::collapse).collect()
}
