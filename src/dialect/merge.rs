/// 合并式序列化
///
/// 把一组编辑应用到已解析的文件上，只改写受影响记录的字节区间，
/// 其余文本（注释、空行、非拥有块、未变更记录）逐字节保留。
///
/// 处理顺序：
/// 1. 所有 `Remove` 先执行
/// 2. `Upsert` 原地替换该键最后一条存活记录（更早的重复记录被删除）
/// 3. 没有该键时，原地替换第一条存活的旧键记录（重命名后位置不变）
/// 4. 都没有时追加到插入位置
/// 5. 其余旧键记录一律删除
use std::collections::HashMap;
use std::ops::Range;

use log::{debug, warn};

use super::document::ParsedFile;
use super::lexer::{line_end, line_start};
use super::Dialect;
use crate::utils::{fold_key, same_key};

/// 单条编辑
#[derive(Debug, Clone, PartialEq)]
pub enum Edit<T> {
    /// 写入 `key`，并清理 `stale_keys` 下的旧记录
    Upsert {
        key: String,
        stale_keys: Vec<String>,
        value: T,
    },
    /// 删除这些键下的全部记录
    Remove { keys: Vec<String> },
}

impl<T> Edit<T> {
    pub fn upsert(key: impl Into<String>, value: T) -> Self {
        Edit::Upsert {
            key: key.into(),
            stale_keys: Vec::new(),
            value,
        }
    }

    /// 带旧键的写入，旧键中与 `key` 相同的项会被剔除
    pub fn upsert_renamed<I, S>(key: impl Into<String>, stale_keys: I, value: T) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let mut stale: Vec<String> = Vec::new();
        for candidate in stale_keys.into_iter().map(Into::into) {
            if !same_key(&candidate, &key) && !stale.iter().any(|s| same_key(s, &candidate)) {
                stale.push(candidate);
            }
        }
        Edit::Upsert {
            key,
            stale_keys: stale,
            value,
        }
    }

    pub fn remove<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for key in keys.into_iter().map(Into::into) {
            if !unique.iter().any(|k| same_key(k, &key)) {
                unique.push(key);
            }
        }
        Edit::Remove { keys: unique }
    }
}

/// 合并结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// 合并后的完整文本
    pub text: String,
    /// 原地替换的记录数
    pub replaced: usize,
    /// 删除的记录数
    pub removed: usize,
    /// 追加的记录数
    pub appended: usize,
    /// 同时存在新旧键记录的键（新键记录获胜）
    pub conflicts: Vec<String>,
}

impl MergeResult {
    /// 是否有任何记录被改动
    pub fn touched(&self) -> bool {
        self.replaced + self.removed + self.appended > 0
    }
}

/// 写入目标
#[derive(Debug, Clone, Copy)]
enum Slot {
    Record(usize),
    Appended(usize),
}

/// 一次文本替换
struct Splice {
    range: Range<usize>,
    text: String,
}

/// 将编辑合并到已解析的文件
pub fn merge<D>(dialect: &D, file: &ParsedFile<D::Value>, edits: Vec<Edit<D::Value>>) -> MergeResult
where
    D: Dialect + ?Sized,
{
    let records = file.records();
    let newline = file.newline();
    let mut live = vec![true; records.len()];
    // 已被本次合并写入的记录，不再参与后续匹配
    let mut taken = vec![false; records.len()];
    let mut replacements: HashMap<usize, String> = HashMap::new();
    let mut appended: Vec<String> = Vec::new();
    let mut claimed: HashMap<String, Slot> = HashMap::new();
    let mut result = MergeResult::default();

    let matching = |live: &[bool], taken: &[bool], keys: &[&str]| -> Vec<usize> {
        records
            .iter()
            .enumerate()
            .filter(|(i, r)| live[*i] && !taken[*i] && keys.iter().any(|k| same_key(k, &r.key)))
            .map(|(i, _)| i)
            .collect()
    };

    let (removes, upserts): (Vec<_>, Vec<_>) = edits
        .into_iter()
        .partition(|edit| matches!(edit, Edit::Remove { .. }));

    for edit in removes {
        if let Edit::Remove { keys } = edit {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            for i in matching(&live, &taken, &keys) {
                debug!("merge: removing record '{}' (line {})", records[i].key, records[i].line);
                live[i] = false;
                result.removed += 1;
            }
        }
    }

    for edit in upserts {
        let Edit::Upsert {
            key,
            stale_keys,
            value,
        } = edit
        else {
            continue;
        };

        // 同一次合并中重复写入同一个键：覆盖先前的结果
        if let Some(slot) = claimed.get(&fold_key(&key)).copied() {
            match slot {
                Slot::Record(i) => {
                    let text = dialect.render(&key, &value, &records[i].indent, newline);
                    replacements.insert(i, text);
                }
                Slot::Appended(n) => {
                    appended[n] = dialect.render(&key, &value, &file.site().indent, newline);
                }
            }
            continue;
        }

        let current = matching(&live, &taken, &[key.as_str()]);
        let stale_refs: Vec<&str> = stale_keys.iter().map(String::as_str).collect();
        let stale = matching(&live, &taken, &stale_refs);

        let target = if let Some((&last, earlier)) = current.split_last() {
            for &i in earlier {
                live[i] = false;
                result.removed += 1;
            }
            if !stale.is_empty() {
                warn!(
                    "merge: '{}' also exists under a previous name; the stale record is dropped",
                    key
                );
                result.conflicts.push(key.clone());
            }
            for &i in &stale {
                live[i] = false;
                result.removed += 1;
            }
            Some(last)
        } else if let Some((&first, rest)) = stale.split_first() {
            for &i in rest {
                live[i] = false;
                result.removed += 1;
            }
            debug!(
                "merge: '{}' replaces record '{}' in place",
                key, records[first].key
            );
            Some(first)
        } else {
            None
        };

        match target {
            // 内容与拼写都未变：保留原文
            Some(i) if records[i].key == key && records[i].value == value => {
                taken[i] = true;
                claimed.insert(fold_key(&key), Slot::Record(i));
            }
            Some(i) => {
                let text = dialect.render(&key, &value, &records[i].indent, newline);
                replacements.insert(i, text);
                taken[i] = true;
                claimed.insert(fold_key(&key), Slot::Record(i));
                result.replaced += 1;
            }
            None => {
                appended.push(dialect.render(&key, &value, &file.site().indent, newline));
                claimed.insert(fold_key(&key), Slot::Appended(appended.len() - 1));
                result.appended += 1;
            }
        }
    }

    let source = file.source();
    let mut splices: Vec<Splice> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        if let Some(text) = replacements.remove(&i) {
            if live[i] {
                splices.push(Splice {
                    range: record.span.clone(),
                    text,
                });
                continue;
            }
        }
        if !live[i] {
            splices.push(Splice {
                range: removal_range(source, &record.span),
                text: String::new(),
            });
        }
    }

    if !appended.is_empty() {
        splices.push(Splice {
            range: file.site().offset..file.site().offset,
            text: insertion_text(source, file, &appended),
        });
    }

    splices.sort_by_key(|s| (s.range.start, s.range.end));

    let mut text = String::with_capacity(source.len());
    let mut cursor = 0;
    for splice in splices {
        let start = splice.range.start.max(cursor);
        text.push_str(&source[cursor..start]);
        text.push_str(&splice.text);
        cursor = splice.range.end.max(start);
    }
    text.push_str(&source[cursor..]);

    result.text = text;
    result
}

/// 把编辑分派到同一类别的多个文件（按读取顺序，后读的覆盖先读的）
///
/// 删除应用到每个文件。写入落在最后一个含有该键或旧键记录的文件，
/// 没有这样的文件时落在第一个文件；其余文件中这些键的记录一并删除，
/// 以免重新加载时被旧记录覆盖。
pub fn route<T>(files: &[ParsedFile<T>], edits: Vec<Edit<T>>) -> Vec<Vec<Edit<T>>> {
    let mut routed: Vec<Vec<Edit<T>>> = files.iter().map(|_| Vec::new()).collect();
    if files.is_empty() {
        return routed;
    }

    for edit in edits {
        match edit {
            Edit::Remove { keys } => {
                for slot in routed.iter_mut() {
                    slot.push(Edit::Remove { keys: keys.clone() });
                }
            }
            Edit::Upsert {
                key,
                stale_keys,
                value,
            } => {
                let owner = files
                    .iter()
                    .rposition(|file| {
                        file.contains(&key) || stale_keys.iter().any(|k| file.contains(k))
                    })
                    .unwrap_or(0);
                for (i, slot) in routed.iter_mut().enumerate() {
                    if i != owner {
                        let keys = std::iter::once(key.as_str())
                            .chain(stale_keys.iter().map(String::as_str));
                        slot.push(Edit::remove(keys));
                    }
                }
                routed[owner].push(Edit::Upsert {
                    key,
                    stale_keys,
                    value,
                });
            }
        }
    }

    routed
}

/// 删除区间：记录独占整行时连同这些行一起删除
fn removal_range(source: &str, span: &Range<usize>) -> Range<usize> {
    let start = line_start(source, span.start);
    let end = line_end(source, span.end);

    let before_blank = source[start..span.start].trim().is_empty();
    let after_blank = source[span.end..end].trim().is_empty();

    if before_blank && after_blank {
        let end = if end < source.len() { end + 1 } else { end };
        start..end
    } else {
        span.clone()
    }
}

/// 追加文本（必要时补换行，必要时新建包装块）
fn insertion_text<T>(source: &str, file: &ParsedFile<T>, rendered: &[String]) -> String {
    let site = file.site();
    let newline = file.newline();
    let mut text = String::new();

    if site.offset > 0 && !source[..site.offset].ends_with('\n') {
        text.push_str(newline);
    }

    match &site.wrapper {
        Some(wrapper) => {
            text.push_str(wrapper);
            text.push_str(" = {");
            text.push_str(newline);
            for entry in rendered {
                text.push_str(&site.indent);
                text.push_str(entry);
                text.push_str(newline);
            }
            text.push('}');
            text.push_str(newline);
        }
        None => {
            for entry in rendered {
                text.push_str(&site.indent);
                text.push_str(entry);
                text.push_str(newline);
            }
        }
    }

    text
}
