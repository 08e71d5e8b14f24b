//! Domain entities
//!
//! Players and the dimension tables (paths, classes, familiars) that runs
//! reference by name.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ascension::Run;
use super::slug::slugify;

/// A player; the display name is re-synced on every observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
}

impl Player {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntity {
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl PathEntity {
    pub fn discovered(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slugify(name),
            image: None,
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntity {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamiliarEntity {
    pub name: String,
    pub image: Option<String>,
}

/// Dimension values already present in the store, preloaded once per ingestion
#[derive(Debug, Clone, Default)]
pub struct KnownDimensions {
    pub paths: HashSet<String>,
    pub classes: HashSet<String>,
    pub familiars: HashSet<String>,
    pub familiars_with_image: HashSet<String>,
}

impl KnownDimensions {
    /// Marks everything in `new` as known so later batches skip it
    pub fn absorb(&mut self, new: &NewDimensions) {
        self.paths.extend(new.paths.iter().map(|p| p.name.clone()));
        self.classes.extend(new.classes.iter().map(|c| c.name.clone()));
        for familiar in &new.familiars {
            self.familiars.insert(familiar.name.clone());
            if familiar.image.is_some() {
                self.familiars_with_image.insert(familiar.name.clone());
            }
        }
        self.familiars_with_image
            .extend(new.familiar_images.iter().map(|f| f.name.clone()));
    }
}

/// Dimension values referenced by a batch of runs but not yet stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDimensions {
    pub paths: Vec<PathEntity>,
    pub classes: Vec<ClassEntity>,
    pub familiars: Vec<FamiliarEntity>,
    /// Familiars already stored without an icon, for which a run supplied one
    pub familiar_images: Vec<FamiliarEntity>,
}

impl NewDimensions {
    /// Collects unseen dimension values in run order; when several runs share a
    /// new value, the first one observed decides its attributes.
    #[must_use]
    pub fn discover(runs: &[Run], known: &KnownDimensions) -> Self {
        let mut out = Self::default();
        let mut seen_paths = HashSet::new();
        let mut seen_classes = HashSet::new();
        let mut seen_familiars = HashSet::new();

        for run in runs {
            if !known.paths.contains(&run.path_name) && seen_paths.insert(run.path_name.clone()) {
                out.paths.push(PathEntity::discovered(&run.path_name));
            }

            if !known.classes.contains(&run.class_name) && seen_classes.insert(run.class_name.clone()) {
                out.classes.push(ClassEntity {
                    name: run.class_name.clone(),
                    image: None,
                });
            }

            let name = &run.familiar_name;
            if !known.familiars.contains(name) {
                if seen_familiars.insert(name.clone()) {
                    out.familiars.push(FamiliarEntity {
                        name: name.clone(),
                        image: run.familiar_image.clone(),
                    });
                }
            } else if !known.familiars_with_image.contains(name)
                && run.familiar_image.is_some()
                && seen_familiars.insert(name.clone())
            {
                out.familiar_images.push(FamiliarEntity {
                    name: name.clone(),
                    image: run.familiar_image.clone(),
                });
            }
        }

        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
            && self.classes.is_empty()
            && self.familiars.is_empty()
            && self.familiar_images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ascension::{ExtraScore, Lifestyle};

    fn run(number: i32, path: &str, class: &str, familiar: &str, image: Option<&str>) -> Run {
        Run {
            player_id: 1,
            run_number: number,
            date: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
            level: 13,
            class_name: class.to_string(),
            sign: "Vole".to_string(),
            turns: 500,
            days: 3,
            familiar_name: familiar.to_string(),
            familiar_percentage: 50.0,
            familiar_image: image.map(str::to_string),
            lifestyle: Lifestyle::Hardcore,
            path_name: path.to_string(),
            dropped: false,
            abandoned: false,
            extra: ExtraScore::None,
        }
    }

    #[test]
    fn first_observed_wins_within_batch() {
        let runs = vec![
            run(1, "You, Robot", "Seal Clubber", "Grey Goose", Some("greygoose.gif")),
            run(2, "You, Robot", "Seal Clubber", "Grey Goose", Some("other.gif")),
        ];
        let new = NewDimensions::discover(&runs, &KnownDimensions::default());

        assert_eq!(new.paths.len(), 1);
        assert_eq!(new.paths[0].slug, "you-robot");
        assert_eq!(new.classes.len(), 1);
        assert_eq!(new.familiars.len(), 1);
        assert_eq!(new.familiars[0].image.as_deref(), Some("greygoose.gif"));
    }

    #[test]
    fn known_values_are_skipped_but_icons_backfilled() {
        let mut known = KnownDimensions::default();
        known.paths.insert("Standard".to_string());
        known.classes.insert("Sauceror".to_string());
        known.familiars.insert("Mosquito".to_string());

        let runs = vec![
            run(1, "Standard", "Sauceror", "Mosquito", None),
            run(2, "Standard", "Sauceror", "Mosquito", Some("mosquito.gif")),
        ];
        let new = NewDimensions::discover(&runs, &known);

        assert!(new.paths.is_empty());
        assert!(new.classes.is_empty());
        assert!(new.familiars.is_empty());
        assert_eq!(new.familiar_images.len(), 1);
        assert_eq!(new.familiar_images[0].image.as_deref(), Some("mosquito.gif"));

        known.absorb(&new);
        assert!(NewDimensions::discover(&runs, &known).is_empty());
    }
}
