/// 属性块 ⇄ 地理属性
use crate::dialect::Properties;
use crate::model::{LocationAttributes, DEFAULT_HARBOR_SUITABILITY};

/// 地理属性映射器
///
/// 缺失字段取默认值（空字符串，港口适宜度为 `"0.00"`）；
/// 输出时省略等于默认值的字段，未知属性追加在固定字段之后。
pub struct LocationMapper;

impl LocationMapper {
    pub fn to_attributes(props: &Properties) -> LocationAttributes {
        let mut attributes = LocationAttributes::default();
        for (key, value) in props {
            attributes.set_field(key, value.clone());
        }
        attributes
    }

    pub fn to_properties(attributes: &LocationAttributes) -> Properties {
        let mut props = Properties::new();

        for (name, value) in attributes.fixed_fields() {
            let is_default = value.is_empty()
                || (name == "natural_harbor_suitability" && value == DEFAULT_HARBOR_SUITABILITY);
            if !is_default {
                props.insert(name.to_string(), value.to_string());
            }
        }
        for (key, value) in &attributes.extra {
            props.insert(key.clone(), value.clone());
        }

        props
    }
}
