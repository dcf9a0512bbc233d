//! In-process relational store.
//!
//! One ordered table per entity, keyed by id, plus the unique indexes the engine relies on
//! (ward/bed/category codes, one schedule per order, one administration per due instant).
//! Related records reference each other by id only.
//!
//! All writes happen inside [`Store::transaction`]. The transaction holds the write lock for
//! its whole duration and keeps an undo log: if the closure returns an error (or panics), every
//! write it made is reverted before the lock is released, so multi-table changes such as
//! "create admission + claim bed" are all-or-nothing.

use crate::admissions::Admission;
use crate::emergency::EmergencyEvent;
use crate::medication::{MedicationAdministration, MedicationSchedule};
use crate::orders::DoctorOrder;
use crate::registry::{Bed, RoomCategory, Ward};
use crate::vitals::VitalsRecord;
use crate::EngineResult;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use ward_types::Code;
use ward_uuid::{
    AdministrationId, AdmissionId, BedId, EventId, OrderId, RoomCategoryId, ScheduleId, VitalsId,
    WardId,
};

/// Natural key of a materialized medication task.
pub(crate) type DoseKey = (ScheduleId, DateTime<Utc>);

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub wards: BTreeMap<WardId, Ward>,
    pub categories: BTreeMap<RoomCategoryId, RoomCategory>,
    pub beds: BTreeMap<BedId, Bed>,
    pub admissions: BTreeMap<AdmissionId, Admission>,
    pub orders: BTreeMap<OrderId, DoctorOrder>,
    pub schedules: BTreeMap<ScheduleId, MedicationSchedule>,
    pub administrations: BTreeMap<AdministrationId, MedicationAdministration>,
    pub vitals: BTreeMap<VitalsId, VitalsRecord>,
    pub events: BTreeMap<EventId, EmergencyEvent>,

    pub ward_codes: BTreeMap<Code, WardId>,
    pub category_codes: BTreeMap<Code, RoomCategoryId>,
    pub bed_codes: BTreeMap<Code, BedId>,
    pub schedule_by_order: BTreeMap<OrderId, ScheduleId>,
    pub dose_index: BTreeMap<DoseKey, AdministrationId>,
}

type Undo = Box<dyn FnOnce(&mut Tables)>;

/// A write transaction over [`Tables`].
pub(crate) struct Transaction<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            undo: Vec::new(),
            committed: false,
        }
    }

    /// Read access, including this transaction's own uncommitted writes.
    pub fn tables(&self) -> &Tables {
        self.tables
    }

    fn put<K, V>(&mut self, table: fn(&mut Tables) -> &mut BTreeMap<K, V>, key: K, value: V)
    where
        K: Ord + Clone + 'static,
        V: 'static,
    {
        let previous = table(self.tables).insert(key.clone(), value);
        self.undo.push(Box::new(move |t: &mut Tables| match previous {
            Some(v) => {
                table(t).insert(key, v);
            }
            None => {
                table(t).remove(&key);
            }
        }));
    }

    pub fn put_ward(&mut self, ward: Ward) {
        self.put(wards, ward.id, ward);
    }

    pub fn put_category(&mut self, category: RoomCategory) {
        self.put(categories, category.id, category);
    }

    pub fn put_bed(&mut self, bed: Bed) {
        self.put(beds, bed.id, bed);
    }

    pub fn put_admission(&mut self, admission: Admission) {
        self.put(admissions, admission.id, admission);
    }

    pub fn put_order(&mut self, order: DoctorOrder) {
        self.put(orders, order.id, order);
    }

    pub fn put_schedule(&mut self, schedule: MedicationSchedule) {
        self.put(schedules, schedule.id, schedule);
    }

    pub fn put_administration(&mut self, administration: MedicationAdministration) {
        self.put(administrations, administration.id, administration);
    }

    pub fn put_vitals(&mut self, record: VitalsRecord) {
        self.put(vitals, record.id, record);
    }

    pub fn put_event(&mut self, event: EmergencyEvent) {
        self.put(events, event.id, event);
    }

    pub fn index_ward_code(&mut self, code: Code, id: WardId) {
        self.put(ward_codes, code, id);
    }

    pub fn index_category_code(&mut self, code: Code, id: RoomCategoryId) {
        self.put(category_codes, code, id);
    }

    pub fn index_bed_code(&mut self, code: Code, id: BedId) {
        self.put(bed_codes, code, id);
    }

    pub fn index_schedule_order(&mut self, order_id: OrderId, schedule_id: ScheduleId) {
        self.put(schedule_by_order, order_id, schedule_id);
    }

    pub fn index_dose(&mut self, key: DoseKey, id: AdministrationId) {
        self.put(dose_index, key, id);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(undo) = self.undo.pop() {
            undo(self.tables);
        }
    }
}

fn wards(t: &mut Tables) -> &mut BTreeMap<WardId, Ward> {
    &mut t.wards
}
fn categories(t: &mut Tables) -> &mut BTreeMap<RoomCategoryId, RoomCategory> {
    &mut t.categories
}
fn beds(t: &mut Tables) -> &mut BTreeMap<BedId, Bed> {
    &mut t.beds
}
fn admissions(t: &mut Tables) -> &mut BTreeMap<AdmissionId, Admission> {
    &mut t.admissions
}
fn orders(t: &mut Tables) -> &mut BTreeMap<OrderId, DoctorOrder> {
    &mut t.orders
}
fn schedules(t: &mut Tables) -> &mut BTreeMap<ScheduleId, MedicationSchedule> {
    &mut t.schedules
}
fn administrations(t: &mut Tables) -> &mut BTreeMap<AdministrationId, MedicationAdministration> {
    &mut t.administrations
}
fn vitals(t: &mut Tables) -> &mut BTreeMap<VitalsId, VitalsRecord> {
    &mut t.vitals
}
fn events(t: &mut Tables) -> &mut BTreeMap<EventId, EmergencyEvent> {
    &mut t.events
}
fn ward_codes(t: &mut Tables) -> &mut BTreeMap<Code, WardId> {
    &mut t.ward_codes
}
fn category_codes(t: &mut Tables) -> &mut BTreeMap<Code, RoomCategoryId> {
    &mut t.category_codes
}
fn bed_codes(t: &mut Tables) -> &mut BTreeMap<Code, BedId> {
    &mut t.bed_codes
}
fn schedule_by_order(t: &mut Tables) -> &mut BTreeMap<OrderId, ScheduleId> {
    &mut t.schedule_by_order
}
fn dose_index(t: &mut Tables) -> &mut BTreeMap<DoseKey, AdministrationId> {
    &mut t.dose_index
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Runs `f` as one atomic unit; an `Err` from `f` reverts all of its writes.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut tx = Transaction::new(&mut guard);
        let result = f(&mut tx);
        if result.is_ok() {
            tx.committed = true;
        }
        drop(tx);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Ward;
    use crate::EngineError;

    fn ward(code: &str) -> Ward {
        Ward {
            id: WardId::new(),
            code: Code::new(code).unwrap(),
            name: ward_types::NonEmptyText::new("General").unwrap(),
            floor: 1,
            building: None,
            active: true,
            total_beds: 0,
        }
    }

    #[test]
    fn test_committed_writes_are_visible() {
        let store = Store::default();
        let w = ward("GEN");
        let id = w.id;

        store
            .transaction(|tx| {
                tx.index_ward_code(w.code.clone(), w.id);
                tx.put_ward(w);
                Ok(())
            })
            .unwrap();

        assert!(store.read(|t| t.wards.contains_key(&id)));
        assert_eq!(store.read(|t| t.ward_codes.len()), 1);
    }

    #[test]
    fn test_error_rolls_back_every_write() {
        let store = Store::default();
        let w = ward("GEN");

        let result: EngineResult<()> = store.transaction(|tx| {
            tx.index_ward_code(w.code.clone(), w.id);
            tx.put_ward(w);
            Err(EngineError::InvalidInput("boom".into()))
        });

        assert!(result.is_err());
        assert!(store.read(|t| t.wards.is_empty() && t.ward_codes.is_empty()));
    }

    #[test]
    fn test_rollback_restores_previous_value() {
        let store = Store::default();
        let w = ward("GEN");
        let id = w.id;
        store
            .transaction(|tx| {
                tx.put_ward(w);
                Ok(())
            })
            .unwrap();

        let _ = store.transaction(|tx| -> EngineResult<()> {
            let mut changed = tx.tables().wards[&id].clone();
            changed.floor = 9;
            tx.put_ward(changed);
            assert_eq!(tx.tables().wards[&id].floor, 9);
            Err(EngineError::InvalidInput("abort".into()))
        });

        assert_eq!(store.read(|t| t.wards[&id].floor), 1);
    }
}
