//! Backend records.
//!
//! Field names follow the backend's JSON (`nama`, `siswaId`, `mapelId`).

use serde::{Deserialize, Serialize};

/// A subject (mata pelajaran).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapel {
    pub id: i64,
    pub nama: String,
}

/// Body for creating or renaming a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMapel {
    pub nama: String,
}

/// A student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Siswa {
    pub id: i64,
    pub nama: String,
}

/// One grade of one student in one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nilai {
    pub id: i64,
    pub siswa_id: i64,
    pub mapel_id: i64,
    pub nilai: f64,
}

/// Body for creating or replacing a grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNilai {
    pub siswa_id: i64,
    pub mapel_id: i64,
    pub nilai: f64,
}

/// Mean of `grades`, or `None` when empty.
#[must_use]
pub fn average(grades: &[Nilai]) -> Option<f64> {
    if grades.is_empty() {
        return None;
    }
    let sum: f64 = grades.iter().map(|n| n.nilai).sum();
    Some(sum / grades.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nilai_uses_backend_field_names() {
        let nilai = Nilai {
            id: 3,
            siswa_id: 1,
            mapel_id: 2,
            nilai: 87.5,
        };
        let value = serde_json::to_value(&nilai).unwrap();
        assert_eq!(value, json!({"id": 3, "siswaId": 1, "mapelId": 2, "nilai": 87.5}));

        let parsed: Nilai =
            serde_json::from_value(json!({"id": 4, "siswaId": 9, "mapelId": 1, "nilai": 70})).unwrap();
        assert_eq!(parsed.siswa_id, 9);
        assert!((parsed.nilai - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn average_of_grades() {
        assert_eq!(average(&[]), None);
        let grades = [80.0, 90.0, 70.0].map(|nilai| Nilai {
            id: 0,
            siswa_id: 1,
            mapel_id: 1,
            nilai,
        });
        assert_eq!(average(&grades), Some(80.0));
    }
}
