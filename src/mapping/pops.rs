/// 人口块 ⇄ 人口记录组
use log::debug;

use crate::dialect::PopBlock;
use crate::model::PopGroup;

pub struct PopMapper;

impl PopMapper {
    /// 读入时合并重复身份（后出现的数值覆盖先出现的）
    pub fn to_group(location: &str, block: &PopBlock) -> PopGroup {
        let mut group = PopGroup {
            pops: Vec::with_capacity(block.pops.len()),
            extra: block.extra.clone(),
        };
        for pop in &block.pops {
            if group.upsert(pop.clone()) {
                debug!(
                    "{}: duplicate pop {}/{}/{} merged",
                    location, pop.pop_type, pop.culture, pop.religion
                );
            }
        }
        group
    }

    pub fn to_block(group: &PopGroup) -> PopBlock {
        PopBlock {
            pops: group.pops.clone(),
            extra: group.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PopDefinition;

    #[test]
    fn test_duplicates_reconciled_on_read() {
        let block = PopBlock {
            pops: vec![
                PopDefinition::new("peasants", 1.0, "swedish", "lutheran"),
                PopDefinition::new("peasants", 3.0, "swedish", "lutheran"),
            ],
            extra: vec![("note".to_string(), "x".to_string())],
        };
        let group = PopMapper::to_group("stockholm", &block);
        assert_eq!(group.len(), 1);
        assert_eq!(group.pops[0].size, 3.0);

        let back = PopMapper::to_block(&group);
        assert_eq!(back.pops.len(), 1);
        assert_eq!(back.extra, block.extra);
    }
}
