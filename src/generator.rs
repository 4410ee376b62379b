//! Synthetic imaging object generation.
//!
//! Every object gets fresh `2.25.<uuid>` identifiers (so they stay
//! unique across processes, whatever the random seed), patient and
//! equipment attributes drawn from small value pools, and a signed
//! 16-bit test pattern as pixel data.

use std::path::{Path, PathBuf};

use chrono::Local;
use dicom_core::value::PrimitiveValue;
use dicom_core::{DataElement, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use smallvec::smallvec;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::common::sop_classes::{Modality, SopClassTable};
use crate::error::{EmulatorError, Result};

const SURNAMES: &[&str] = &[
    "SMITH", "JOHNSON", "WILLIAMS", "BROWN", "JONES", "GARCIA", "MILLER", "DAVIS", "RODRIGUEZ",
    "MARTINEZ",
];
const SEXES: &[&str] = &["M", "F", "O"];
const MANUFACTURERS: &[&str] = &[
    "SIEMENS",
    "GE MEDICAL SYSTEMS",
    "PHILIPS",
    "TOSHIBA",
    "CANON",
    "HITACHI",
];
const IMAGE_SIZES: &[u16] = &[64, 128, 256, 512];

/// A fresh UID under the UUID-derived root `2.25`.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

#[derive(Debug, Clone)]
pub struct PatientInfo {
    pub id: String,
    pub name: String,
    pub birth_date: String,
    pub sex: String,
}

#[derive(Debug, Clone)]
pub struct StudyInfo {
    pub date: String,
    pub time: String,
    pub id: String,
    pub accession_number: String,
}

#[derive(Debug, Clone)]
pub struct SeriesInfo {
    pub number: u32,
    pub instance_number: u32,
}

#[derive(Debug, Clone)]
pub struct EquipmentInfo {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub software_versions: String,
}

/// Native pixel data and its declared geometry.
#[derive(Debug, Clone)]
pub struct ImagePixels {
    pub rows: u16,
    pub columns: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    /// 1 for signed samples.
    pub pixel_representation: u16,
    pub pixel_spacing: [f64; 2],
    /// Little endian samples, `rows * columns * bits_allocated / 8` bytes.
    pub data: Vec<u8>,
}

impl ImagePixels {
    pub fn expected_len(&self) -> usize {
        self.rows as usize * self.columns as usize * (self.bits_allocated as usize / 8)
    }
}

#[derive(Debug, Clone)]
pub struct ImagingObject {
    pub sop_class_uid: &'static str,
    pub sop_instance_uid: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    pub modality: Modality,
    pub patient: PatientInfo,
    pub study: StudyInfo,
    pub series: SeriesInfo,
    pub image: ImagePixels,
    pub equipment: EquipmentInfo,
}

impl ImagingObject {
    /// Build the DICOM data set (without file meta group).
    pub fn to_dataset(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();

        let mut put_str = |tag, vr, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };

        put_str(tags::SOP_CLASS_UID, VR::UI, self.sop_class_uid);
        put_str(tags::SOP_INSTANCE_UID, VR::UI, &self.sop_instance_uid);
        put_str(tags::STUDY_DATE, VR::DA, &self.study.date);
        put_str(tags::STUDY_TIME, VR::TM, &self.study.time);
        put_str(tags::ACCESSION_NUMBER, VR::SH, &self.study.accession_number);
        put_str(tags::MODALITY, VR::CS, self.modality.code());
        put_str(tags::MANUFACTURER, VR::LO, &self.equipment.manufacturer);
        put_str(tags::MANUFACTURER_MODEL_NAME, VR::LO, &self.equipment.model);
        put_str(tags::PATIENT_NAME, VR::PN, &self.patient.name);
        put_str(tags::PATIENT_ID, VR::LO, &self.patient.id);
        put_str(tags::PATIENT_BIRTH_DATE, VR::DA, &self.patient.birth_date);
        put_str(tags::PATIENT_SEX, VR::CS, &self.patient.sex);
        put_str(tags::DEVICE_SERIAL_NUMBER, VR::LO, &self.equipment.serial);
        put_str(tags::SOFTWARE_VERSIONS, VR::LO, &self.equipment.software_versions);
        put_str(tags::STUDY_INSTANCE_UID, VR::UI, &self.study_instance_uid);
        put_str(tags::SERIES_INSTANCE_UID, VR::UI, &self.series_instance_uid);
        put_str(tags::STUDY_ID, VR::SH, &self.study.id);
        put_str(tags::SERIES_NUMBER, VR::IS, &self.series.number.to_string());
        put_str(tags::INSTANCE_NUMBER, VR::IS, &self.series.instance_number.to_string());
        put_str(tags::FRAME_OF_REFERENCE_UID, VR::UI, &self.frame_of_reference_uid);
        put_str(tags::POSITION_REFERENCE_INDICATOR, VR::LO, "REF");
        put_str(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");

        let image = &self.image;
        for (tag, value) in [
            (tags::SAMPLES_PER_PIXEL, 1),
            (tags::ROWS, image.rows),
            (tags::COLUMNS, image.columns),
            (tags::BITS_ALLOCATED, image.bits_allocated),
            (tags::BITS_STORED, image.bits_stored),
            (tags::HIGH_BIT, image.high_bit),
            (tags::PIXEL_REPRESENTATION, image.pixel_representation),
        ] {
            obj.put(DataElement::new(
                tag,
                VR::US,
                PrimitiveValue::U16(smallvec![value]),
            ));
        }

        obj.put(DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            PrimitiveValue::Strs(smallvec![
                format!("{:.4}", image.pixel_spacing[0]),
                format!("{:.4}", image.pixel_spacing[1]),
            ]),
        ));
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from(image.data.clone()),
        ));

        obj
    }

    /// Write the object as a Part 10 file (Implicit VR Little Endian)
    /// into a uniquely named transient file under `dir`.
    pub fn materialize(&self, dir: &Path) -> Result<TransientArtifact> {
        let file = tempfile::Builder::new()
            .prefix("modality_")
            .suffix(".dcm")
            .tempfile_in(dir)?;

        let file_obj = self
            .to_dataset()
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::IMPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(self.sop_class_uid)
                    .media_storage_sop_instance_uid(self.sop_instance_uid.as_str()),
            )
            .map_err(EmulatorError::encoding)?;
        file_obj
            .write_to_file(file.path())
            .map_err(EmulatorError::encoding)?;

        debug!(
            "Materialized {} object {} at {}",
            self.modality,
            self.sop_instance_uid,
            file.path().display()
        );
        Ok(TransientArtifact { file })
    }
}

/// A generated object file that lives only for the duration of one exchange.
#[derive(Debug)]
pub struct TransientArtifact {
    file: NamedTempFile,
}

impl TransientArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now. Failures are logged; the file is gone from the
    /// caller's point of view either way.
    pub fn remove(self) -> PathBuf {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!("Failed to remove transient file {}: {}", path.display(), e);
        }
        path
    }
}

#[derive(Debug)]
pub struct ObjectGenerator {
    rng: StdRng,
    table: SopClassTable,
}

impl Default for ObjectGenerator {
    fn default() -> Self {
        Self::new(SopClassTable::default())
    }
}

impl ObjectGenerator {
    pub fn new(table: SopClassTable) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            table,
        }
    }

    /// Deterministic attribute values and pixels. UIDs remain unique.
    pub fn with_seed(table: SopClassTable, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            table,
        }
    }

    pub fn random_modality(&mut self) -> Modality {
        *Modality::ALL.choose(&mut self.rng).unwrap_or(&Modality::Ct)
    }

    pub fn generate(&mut self, modality: Modality) -> ImagingObject {
        let rng = &mut self.rng;
        let now = Local::now();

        let surname = pick(rng, SURNAMES);
        let patient = PatientInfo {
            id: format!("PID{}", rng.gen_range(100_000..=999_999)),
            name: format!("RANDOM^{}", surname),
            birth_date: format!(
                "{:04}{:02}{:02}",
                rng.gen_range(1940..=2000),
                rng.gen_range(1..=12),
                rng.gen_range(1..=28)
            ),
            sex: pick(rng, SEXES).to_string(),
        };

        let study = StudyInfo {
            date: now.format("%Y%m%d").to_string(),
            time: now.format("%H%M%S%.3f").to_string(),
            id: format!("STUDY{}", rng.gen_range(10_000..=99_999)),
            accession_number: format!("ACC{}", rng.gen_range(1_000_000..=9_999_999)),
        };

        let series = SeriesInfo {
            number: rng.gen_range(1..=999),
            instance_number: rng.gen_range(1..=9999),
        };

        let manufacturer = pick(rng, MANUFACTURERS);
        let equipment = EquipmentInfo {
            manufacturer: manufacturer.to_string(),
            model: format!("{} MODEL-{}", manufacturer, rng.gen_range(100..=999)),
            serial: format!("SER{}", rng.gen_range(10_000..=99_999)),
            software_versions: format!("SW{}.{}", rng.gen_range(100..=999), rng.gen_range(0..=99)),
        };

        let size = *IMAGE_SIZES.choose(rng).unwrap_or(&256);
        let image = ImagePixels {
            rows: size,
            columns: size,
            bits_allocated: 16,
            bits_stored: 16,
            high_bit: 15,
            pixel_representation: 1,
            pixel_spacing: [0.5 + rng.gen::<f64>(), 0.5 + rng.gen::<f64>()],
            data: synthesize_pixels(rng, size as usize, size as usize),
        };

        ImagingObject {
            sop_class_uid: self.table.storage_class(modality).uid,
            sop_instance_uid: generate_uid(),
            study_instance_uid: generate_uid(),
            series_instance_uid: generate_uid(),
            frame_of_reference_uid: generate_uid(),
            modality,
            patient,
            study,
            series,
            image,
            equipment,
        }
    }
}

fn pick<'a, R: Rng>(rng: &mut R, pool: &[&'a str]) -> &'a str {
    pool.choose(rng).copied().unwrap_or("UNKNOWN")
}

/// Random base value, two gradients, a bright disc in the centre and
/// uniform noise, as little endian `i16` samples.
fn synthesize_pixels<R: Rng>(rng: &mut R, rows: usize, cols: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(rows * cols * 2);
    let (center_y, center_x) = ((rows / 2) as f64, (cols / 2) as f64);
    let radius = (rows.min(cols) / 4) as f64;

    for i in 0..rows {
        for j in 0..cols {
            let base: i32 = rng.gen_range(-1000..=2000);
            let grad_x = (j * 500 / cols) as i32;
            let grad_y = (i * 500 / rows) as i32;
            let distance = ((i as f64 - center_y).powi(2) + (j as f64 - center_x).powi(2)).sqrt();
            let disc = if distance < radius { 800 } else { 0 };
            let noise: i32 = rng.gen_range(-100..=100);

            let value = (base + grad_x + grad_y + disc + noise)
                .clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_object::open_file;
    use std::collections::HashSet;

    #[test]
    fn test_pixel_length_matches_geometry() {
        let mut generator = ObjectGenerator::with_seed(SopClassTable::default(), 7);
        for modality in Modality::ALL {
            let obj = generator.generate(modality);
            let image = &obj.image;
            assert_eq!(image.rows, image.columns);
            assert!(IMAGE_SIZES.contains(&image.rows));
            assert_eq!(image.bits_allocated, 16);
            assert_eq!(
                image.data.len(),
                image.rows as usize * image.columns as usize * 2
            );
            assert_eq!(image.data.len(), image.expected_len());
        }
    }

    #[test]
    fn test_class_uid_follows_table() {
        let table = SopClassTable::default();
        let mut generator = ObjectGenerator::with_seed(table, 1);
        for modality in Modality::ALL {
            let obj = generator.generate(modality);
            assert_eq!(obj.sop_class_uid, table.storage_class(modality).uid);
            assert_eq!(obj.modality, modality);
        }
    }

    #[test]
    fn test_uids_unique_between_objects() {
        // same seed on purpose: identifiers must not depend on it
        let mut a = ObjectGenerator::with_seed(SopClassTable::default(), 42);
        let mut b = ObjectGenerator::with_seed(SopClassTable::default(), 42);
        let first = a.generate(Modality::Ct);
        let second = b.generate(Modality::Ct);

        let ids = |o: &ImagingObject| {
            [
                o.sop_instance_uid.clone(),
                o.study_instance_uid.clone(),
                o.series_instance_uid.clone(),
            ]
            .into_iter()
            .collect::<HashSet<_>>()
        };
        let (x, y) = (ids(&first), ids(&second));
        assert_eq!(x.len(), 3);
        assert!(x.is_disjoint(&y));
        assert!(first.sop_instance_uid.starts_with("2.25."));
        assert!(first.sop_instance_uid.len() <= 64);
    }

    #[test]
    fn test_attribute_pools() {
        let mut generator = ObjectGenerator::with_seed(SopClassTable::default(), 3);
        for _ in 0..20 {
            let obj = generator.generate(Modality::Mr);
            let year: i32 = obj.patient.birth_date[..4].parse().unwrap();
            assert!((1940..=2000).contains(&year));
            assert!(SEXES.contains(&obj.patient.sex.as_str()));
            assert!(MANUFACTURERS.contains(&obj.equipment.manufacturer.as_str()));
            assert!(obj.patient.name.starts_with("RANDOM^"));
        }
    }

    #[test]
    fn test_dataset_declares_geometry() {
        let mut generator = ObjectGenerator::with_seed(SopClassTable::default(), 11);
        let obj = generator.generate(Modality::Sc);
        let ds = obj.to_dataset();

        let rows = ds.element(tags::ROWS).unwrap().to_int::<u16>().unwrap();
        let cols = ds.element(tags::COLUMNS).unwrap().to_int::<u16>().unwrap();
        let pixels = ds.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
        assert_eq!(pixels.len(), rows as usize * cols as usize * 2);
        assert_eq!(
            ds.element(tags::MODALITY).unwrap().to_str().unwrap(),
            "SC"
        );
    }

    #[test]
    fn test_materialize_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut generator = ObjectGenerator::with_seed(SopClassTable::default(), 5);
        let obj = generator.generate(Modality::Ct);

        let artifact = obj.materialize(dir.path()).unwrap();
        let reopened = open_file(artifact.path()).unwrap();
        assert_eq!(
            reopened.meta().media_storage_sop_instance_uid.trim_end_matches('\0'),
            obj.sop_instance_uid
        );

        let path = artifact.remove();
        assert!(!path.exists());
    }
}
