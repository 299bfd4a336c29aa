use log::{error, warn};
use regions_shared::{Axis, FieldRef, Region, Unit};

use crate::document::{Document, ElementId};

/// Collects the regions of `<labwc_config><regions><region>` in document order
pub(crate) fn extract_regions(document: &Document) -> Vec<Region> {
    let mut regions = Vec::new();
    walk(document, document.root(), &mut regions);
    regions
}

fn walk(document: &Document, id: ElementId, regions: &mut Vec<Region>) {
    let element = document.element(id);
    if element.is_named("comment") {
        return;
    }
    if element.is_named("region") && is_region_element(document, id) {
        read_region(document, id, regions);
        return;
    }
    for &child in document.children(id) {
        walk(document, child, regions);
    }
}

fn is_region_element(document: &Document, id: ElementId) -> bool {
    let Some(regions) = document.parent(id) else {
        return false;
    };
    let Some(config) = document.parent(regions) else {
        return false;
    };
    document.element(regions).is_named("regions")
        && document.element(config).is_named("labwc_config")
        && document.parent(config).is_none()
}

/// Reads the attributes of a region element first, then its child elements
fn read_region(document: &Document, id: ElementId, regions: &mut Vec<Region>) {
    let element = document.element(id);
    let mut current = None;

    for attribute in element.attributes() {
        read_field(document, attribute.name(), attribute.field(), &mut current, regions);
    }
    for &child in document.children(id) {
        let child = document.element(child);
        if child.is_named("comment") {
            continue;
        }
        read_field(document, child.name(), child.text(), &mut current, regions);
    }
}

fn read_field(
    document: &Document,
    name: &str,
    field: FieldRef,
    current: &mut Option<usize>,
    regions: &mut Vec<Region>,
) {
    let axis = match name {
        "name" => {
            let name = document.field_text(field);
            if name.is_empty() {
                warn!("Ignoring region without a name");
                *current = None;
            } else {
                regions.push(Region::new(name));
                *current = Some(regions.len() - 1);
            }
            return;
        }
        "x" => Axis::X,
        "y" => Axis::Y,
        "width" => Axis::Width,
        "height" => Axis::Height,
        _ => return,
    };

    let Some(region) = current.and_then(|index| regions.get_mut(index)) else {
        error!("Expected a region name before <{name}>");
        return;
    };
    let text = document.field_text(field);
    let unit = if text.contains('%') {
        Unit::Percent
    } else {
        Unit::Pixels
    };
    region.set_axis(axis, f64::from(leading_integer(&text)), unit);
    region.source.set(axis, field);
}

/// The integer at the start of the text: leading whitespace, an optional sign and digits. Text
/// without digits is 0.
fn leading_integer(text: &str) -> i32 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |value, digit| {
            (value * 10 + i64::from(digit - b'0')).min(i64::from(i32::MAX) + 1)
        });
    let value = if negative { -value } else { value };

    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use regions_shared::{Geometry, Units};

    fn extract(source: &str) -> Vec<Region> {
        extract_regions(&Document::parse(source.to_owned()).unwrap())
    }

    #[test]
    fn attribute_and_child_forms() {
        let regions = extract(
            r#"<labwc_config><regions>
                <region name="top" x="0%" y="0%" width="100%" height="50%"/>
                <region><name>bottom</name><x>0</x><y>540</y><width>1920</width><height>540</height></region>
            </regions></labwc_config>"#,
        );

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "top");
        assert_eq!(regions[0].geometry, Geometry::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(regions[0].units, Units::all(Unit::Percent));
        assert_eq!(regions[1].name, "bottom");
        assert_eq!(
            regions[1].geometry,
            Geometry::new(0.0, 540.0, 1920.0, 540.0)
        );
        assert_eq!(regions[1].units, Units::all(Unit::Pixels));
        assert!(Axis::ALL.iter().all(|axis| regions[1].source.get(*axis).is_some()));
    }

    #[test]
    fn names_are_case_insensitive() {
        let regions = extract(
            r#"<LabWC_Config><Regions><REGION Name="a" X="5%"/></Regions></LabWC_Config>"#,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].geometry.x, 5.0);
    }

    #[test]
    fn comments_are_skipped() {
        let regions = extract(
            r#"<labwc_config><regions>
                <!-- <region name="xml-comment"/> -->
                <comment><region name="hidden" x="1"/></comment>
                <region><comment><name>hidden</name></comment><name>shown</name></region>
            </regions></labwc_config>"#,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "shown");
    }

    #[test]
    fn fields_before_a_name_are_dropped() {
        let regions = extract(
            r#"<labwc_config><regions>
                <region><x>10%</x><name>late</name><y>20%</y></region>
                <region name=""><x>5</x></region>
            </regions></labwc_config>"#,
        );
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name, "late");
        assert_eq!(regions[0].geometry.x, 0.0);
        assert_eq!(regions[0].source.x, None);
        assert_eq!(regions[0].geometry.y, 20.0);
        assert_eq!(regions[0].units.y, Unit::Percent);
    }

    #[test]
    fn regions_outside_the_config_path_are_ignored() {
        let regions = extract(
            r#"<labwc_config><region name="stray"/><other><regions><region name="deep"/></regions></other></labwc_config>"#,
        );
        assert!(regions.is_empty());
    }

    #[test]
    fn leading_integer_follows_atoi() {
        assert_eq!(leading_integer("50%"), 50);
        assert_eq!(leading_integer("  -12px"), -12);
        assert_eq!(leading_integer("+7"), 7);
        assert_eq!(leading_integer("abc"), 0);
        assert_eq!(leading_integer(""), 0);
        assert_eq!(leading_integer("99999999999"), i32::MAX);
    }
}
