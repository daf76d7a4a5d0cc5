//! In-memory [`GradesApi`] for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{GradesApi, GradesError};
use crate::models::{Mapel, NewMapel, NewNilai, Nilai, Siswa};

#[derive(Debug, Default)]
struct Tables {
    mapel: Vec<Mapel>,
    siswa: Vec<Siswa>,
    nilai: Vec<Nilai>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeGrades {
    tables: Mutex<Tables>,
}

impl FakeGrades {
    /// Two subjects, two students and three grades for student 1.
    pub(crate) fn seeded() -> Self {
        let mapel = vec![
            Mapel {
                id: 1,
                nama: "Matematika".to_string(),
            },
            Mapel {
                id: 2,
                nama: "IPA".to_string(),
            },
        ];
        let siswa = vec![
            Siswa {
                id: 1,
                nama: "Ani".to_string(),
            },
            Siswa {
                id: 2,
                nama: "Budi".to_string(),
            },
        ];
        let nilai = vec![
            Nilai {
                id: 1,
                siswa_id: 1,
                mapel_id: 1,
                nilai: 80.0,
            },
            Nilai {
                id: 2,
                siswa_id: 1,
                mapel_id: 2,
                nilai: 90.0,
            },
            Nilai {
                id: 3,
                siswa_id: 1,
                mapel_id: 1,
                nilai: 70.0,
            },
        ];
        Self {
            tables: Mutex::new(Tables {
                mapel,
                siswa,
                nilai,
                next_id: 100,
            }),
        }
    }

    pub(crate) fn mapel(&self) -> Vec<Mapel> {
        self.tables.lock().unwrap().mapel.clone()
    }

    pub(crate) fn nilai(&self) -> Vec<Nilai> {
        self.tables.lock().unwrap().nilai.clone()
    }
}

fn not_found(kind: &str, id: i64) -> GradesError {
    GradesError::NotFound(format!("{kind}/{id}"))
}

#[async_trait]
impl GradesApi for FakeGrades {
    async fn list_mapel(&self) -> Result<Vec<Mapel>, GradesError> {
        Ok(self.mapel())
    }

    async fn get_mapel(&self, id: i64) -> Result<Mapel, GradesError> {
        self.mapel()
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found("mapel", id))
    }

    async fn create_mapel(&self, mapel: &NewMapel) -> Result<Mapel, GradesError> {
        let mut tables = self.tables.lock().unwrap();
        let created = Mapel {
            id: tables.next_id(),
            nama: mapel.nama.clone(),
        };
        tables.mapel.push(created.clone());
        Ok(created)
    }

    async fn update_mapel(&self, id: i64, mapel: &NewMapel) -> Result<Mapel, GradesError> {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables
            .mapel
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found("mapel", id))?;
        entry.nama = mapel.nama.clone();
        Ok(entry.clone())
    }

    async fn delete_mapel(&self, id: i64) -> Result<(), GradesError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.mapel.len();
        tables.mapel.retain(|m| m.id != id);
        if tables.mapel.len() == before {
            return Err(not_found("mapel", id));
        }
        Ok(())
    }

    async fn list_siswa(&self) -> Result<Vec<Siswa>, GradesError> {
        Ok(self.tables.lock().unwrap().siswa.clone())
    }

    async fn get_siswa(&self, id: i64) -> Result<Siswa, GradesError> {
        self.tables
            .lock()
            .unwrap()
            .siswa
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("siswa", id))
    }

    async fn list_nilai(&self) -> Result<Vec<Nilai>, GradesError> {
        Ok(self.nilai())
    }

    async fn get_nilai(&self, id: i64) -> Result<Nilai, GradesError> {
        self.nilai()
            .into_iter()
            .find(|n| n.id == id)
            .ok_or_else(|| not_found("nilai", id))
    }

    async fn create_nilai(&self, nilai: &NewNilai) -> Result<Nilai, GradesError> {
        let mut tables = self.tables.lock().unwrap();
        let created = Nilai {
            id: tables.next_id(),
            siswa_id: nilai.siswa_id,
            mapel_id: nilai.mapel_id,
            nilai: nilai.nilai,
        };
        tables.nilai.push(created.clone());
        Ok(created)
    }

    async fn update_nilai(&self, id: i64, nilai: &NewNilai) -> Result<Nilai, GradesError> {
        let mut tables = self.tables.lock().unwrap();
        let entry = tables
            .nilai
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| not_found("nilai", id))?;
        entry.siswa_id = nilai.siswa_id;
        entry.mapel_id = nilai.mapel_id;
        entry.nilai = nilai.nilai;
        Ok(entry.clone())
    }

    async fn delete_nilai(&self, id: i64) -> Result<(), GradesError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.nilai.len();
        tables.nilai.retain(|n| n.id != id);
        if tables.nilai.len() == before {
            return Err(not_found("nilai", id));
        }
        Ok(())
    }
}
