//! Content checksums for staged-record change detection.

use crate::error::Result;
use crate::models::RawProductRecord;

/// Hash the comparable content of a feed record.
///
/// The checksum is what decides insert/update/unchanged on re-sync, so the
/// field order here is load-bearing: reordering it would mark every staged
/// record as changed on the next run.
pub fn record_checksum(rec: &RawProductRecord) -> Result<String> {
    let fields = [
        rec.sku.clone().unwrap_or_default(),
        rec.title.clone().unwrap_or_default(),
        rec.description.clone().unwrap_or_default(),
        rec.price_purchase.map(|p| p.to_string()).unwrap_or_default(),
        rec.price_retail.map(|p| p.to_string()).unwrap_or_default(),
        rec.weight_grams.map(|w| w.to_string()).unwrap_or_default(),
        rec.availability.clone().unwrap_or_default(),
        serde_json::to_string(&rec.categories)?,
        serde_json::to_string(&rec.images)?,
        serde_json::to_string(&rec.attributes)?,
    ];

    let mut hasher = blake3::Hasher::new();
    hasher.update(fields.join("|").as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use rust_decimal_macros::dec;

    fn sample_record() -> RawProductRecord {
        let mut rec = RawProductRecord {
            feed_id: "922".to_string(),
            sku: Some("SKU123".to_string()),
            title: Some("Test Product".to_string()),
            price_purchase: Some(dec!(6.467)),
            price_retail: Some(dec!(11.931)),
            weight_grams: Some(450),
            availability: Some("in stock".to_string()),
            ..Default::default()
        };
        rec.categories.push(Category {
            id: Some("137".to_string()),
            name: Some("Hygiena".to_string()),
        });
        rec.add_image("https://example.com/img.jpg");
        rec.add_attribute("Balenie", "24");
        rec
    }

    #[test]
    fn test_checksum_is_stable() {
        let rec = sample_record();
        assert_eq!(
            record_checksum(&rec).unwrap(),
            record_checksum(&rec.clone()).unwrap()
        );
    }

    #[test]
    fn test_checksum_independent_of_attribute_insertion_order() {
        let mut forward = sample_record();
        forward.add_attribute("Farba", "modrá");
        forward.add_attribute("Objem", "1l");

        let mut reverse = sample_record();
        reverse.add_attribute("Objem", "1l");
        reverse.add_attribute("Farba", "modrá");

        assert_eq!(
            record_checksum(&forward).unwrap(),
            record_checksum(&reverse).unwrap()
        );
    }

    #[test]
    fn test_checksum_tracks_content_changes() {
        let rec = sample_record();
        let base = record_checksum(&rec).unwrap();

        let mut changed = rec.clone();
        changed.price_retail = Some(dec!(12.5));
        assert_ne!(record_checksum(&changed).unwrap(), base);

        let mut changed = rec.clone();
        changed.title = Some("Renamed".to_string());
        assert_ne!(record_checksum(&changed).unwrap(), base);

        let mut changed = rec.clone();
        changed.add_attribute("Farba", "modrá");
        assert_ne!(record_checksum(&changed).unwrap(), base);
    }

    #[test]
    fn test_checksum_ignores_feed_id_and_link() {
        // Identity and navigation fields are not content
        let rec = sample_record();
        let base = record_checksum(&rec).unwrap();

        let mut other = rec.clone();
        other.feed_id = "different".to_string();
        other.link = Some("https://example.com/elsewhere".to_string());
        other.gtin = Some("0000000000000".to_string());
        assert_eq!(record_checksum(&other).unwrap(), base);
    }

    #[test]
    fn test_checksum_absent_fields_are_empty() {
        let empty = RawProductRecord {
            feed_id: "1".to_string(),
            ..Default::default()
        };
        let also_empty = RawProductRecord {
            feed_id: "2".to_string(),
            ..Default::default()
        };
        assert_eq!(
            record_checksum(&empty).unwrap(),
            record_checksum(&also_empty).unwrap()
        );
    }
}
