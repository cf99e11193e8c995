use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    /// Snapshot of a day's slots, ascending by time.
    pub async fn list_slots(&self, date: NaiveDate) -> Vec<Slot> {
        match self.day(&date) {
            Some(day) => day.read().await.slots.clone(),
            None => Vec::new(),
        }
    }

    pub async fn list_reservations(&self, date: NaiveDate) -> Vec<Reservation> {
        let Some(day) = self.day(&date) else {
            return Vec::new();
        };
        let mut reservations = day.read().await.reservations.clone();
        reservations.sort_by_key(|r| (r.time, r.created_at));
        reservations
    }

    pub async fn get_work_plan(&self, date: NaiveDate) -> Option<WorkPlan> {
        let day = self.day(&date)?;
        let guard = day.read().await;
        guard.plan.clone()
    }

    pub fn get_service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    /// All services, ordered by creation (ULIDs sort by time).
    pub fn list_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by_key(|s| s.id);
        services
    }
}
