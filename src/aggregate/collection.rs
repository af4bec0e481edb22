use anyhow::{anyhow, Context, Result};
use geo::Geometry;
use geojson::{feature::Id, FeatureCollection};

use crate::crop::TileFragment;

/// All fragments accumulated for one tile.
///
/// Fragments are kept ordered by feature id, and fragments sharing an id by their content, so
/// the collection does not depend on the order of merges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileCollection {
    fragments: Vec<TileFragment>,
}

impl TileCollection {
    pub fn new() -> Self { Self::default() }

    #[inline] pub fn fragments(&self) -> &[TileFragment] { &self.fragments }

    #[inline] pub fn len(&self) -> usize { self.fragments.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.fragments.is_empty() }

    /// Add `fragment`. Returns `false` if an identical fragment is already present.
    ///
    /// Distinct fragments of the same feature, such as alternate geometries sharing an id, are
    /// all kept.
    pub fn merge(&mut self, fragment: TileFragment) -> bool {
        let start = self.fragments.partition_point(|f| f.feature_id < fragment.feature_id);
        let end = start + self.fragments[start..].partition_point(|f| f.feature_id == fragment.feature_id);
        let same_feature = &self.fragments[start..end];
        if same_feature.contains(&fragment) { return false }

        let key = content_key(&fragment);
        let at = start + same_feature.partition_point(|f| content_key(f) <= key);
        self.fragments.insert(at, fragment);
        true
    }

    /// Whether a fragment of `feature_id` is present.
    pub fn contains(&self, feature_id: i64) -> bool {
        self.fragments.iter().any(|f| f.feature_id == feature_id)
    }

    /// Serialize as a GeoJSON `FeatureCollection`, fragment ids in each feature's `id` member.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let features = self.fragments.iter().map(|fragment| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&fragment.geometry))),
            id: Some(Id::Number(fragment.feature_id.into())),
            properties: Some(fragment.properties.clone()),
            foreign_members: None,
        }).collect();

        let collection = FeatureCollection { bbox: None, features, foreign_members: None };
        serde_json::to_vec(&collection).context("[aggregate] Failed to serialize collection")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_slice(bytes)
            .context("[aggregate] Failed to parse collection")?;

        let mut fragments = Vec::with_capacity(collection.features.len());
        for (i, feature) in collection.features.into_iter().enumerate() {
            let feature_id = match &feature.id {
                Some(Id::Number(n)) => n.as_i64(),
                Some(Id::String(s)) => s.parse().ok(),
                None => None,
            }.ok_or_else(|| anyhow!("[aggregate] Feature {i} has no integer id"))?;

            let geometry = feature.geometry
                .ok_or_else(|| anyhow!("[aggregate] Feature {feature_id} has no geometry"))?;
            let geometry = Geometry::<f64>::try_from(geometry)
                .with_context(|| format!("[aggregate] Feature {feature_id} has an unsupported geometry"))?;

            fragments.push(TileFragment {
                feature_id,
                geometry,
                properties: feature.properties.unwrap_or_default(),
            });
        }

        Ok(fragments.into_iter().collect())
    }
}

/// Total order among fragments of one feature.
fn content_key(fragment: &TileFragment) -> String {
    format!("{:?}{:?}", fragment.geometry, fragment.properties)
}

impl FromIterator<TileFragment> for TileCollection {
    fn from_iter<I: IntoIterator<Item = TileFragment>>(iter: I) -> Self {
        let mut collection = Self::new();
        iter.into_iter().for_each(|fragment| {
            collection.merge(fragment);
        });
        collection
    }
}
