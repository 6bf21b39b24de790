//! Agenda de horários livres de um médico
//!
//! Cada entrada associa um dia do calendário aos rótulos de horário ainda
//! não reservados. Há no máximo uma entrada por dia.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Falha ao reservar um horário
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Horário {label} indisponível em {date}")]
pub struct SlotUnavailable {
    pub date: NaiveDate,
    pub label: String,
}

/// Horários livres de um dia
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDay {
    pub date: NaiveDate,
    pub times: Vec<String>,
}

/// Conjunto ordenado de dias com horários livres
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityLedger {
    days: Vec<SlotDay>,
}

impl AvailabilityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn days(&self) -> &[SlotDay] {
        &self.days
    }

    /// Horários livres de `date`, se o dia existir na agenda
    pub fn times_for(&self, date: NaiveDate) -> Option<&[String]> {
        self.day(date).map(|day| day.times.as_slice())
    }

    pub fn contains(&self, date: NaiveDate, label: &str) -> bool {
        self.times_for(date)
            .map_or(false, |times| times.iter().any(|t| t == label))
    }

    /// Acrescenta horários ao dia, ignorando os que já existem
    pub fn add_slots<I, S>(&mut self, date: NaiveDate, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = match self.days.iter().position(|day| day.date == date) {
            Some(index) => index,
            None => {
                self.days.push(SlotDay {
                    date,
                    times: Vec::new(),
                });
                self.days.len() - 1
            }
        };

        let times = &mut self.days[index].times;
        for label in labels {
            let label = label.into();
            if !times.contains(&label) {
                times.push(label);
            }
        }
    }

    /// Remove o horário da agenda. O dia permanece mesmo que fique vazio.
    pub fn reserve(&mut self, date: NaiveDate, label: &str) -> Result<(), SlotUnavailable> {
        let unavailable = || SlotUnavailable {
            date,
            label: label.to_string(),
        };

        let day = self.day_mut(date).ok_or_else(unavailable)?;
        let position = day
            .times
            .iter()
            .position(|t| t == label)
            .ok_or_else(unavailable)?;
        day.times.remove(position);
        Ok(())
    }

    /// Devolve o horário à agenda, recriando o dia caso ele não exista mais
    pub fn release(&mut self, date: NaiveDate, label: &str) {
        match self.day_mut(date) {
            Some(day) => {
                if !day.times.iter().any(|t| t == label) {
                    day.times.push(label.to_string());
                }
            }
            None => self.days.push(SlotDay {
                date,
                times: vec![label.to_string()],
            }),
        }
    }

    fn day(&self, date: NaiveDate) -> Option<&SlotDay> {
        self.days.iter().find(|day| day.date == date)
    }

    fn day_mut(&mut self, date: NaiveDate) -> Option<&mut SlotDay> {
        self.days.iter_mut().find(|day| day.date == date)
    }
}

/// Interpreta `YYYY-MM-DD` ou um timestamp RFC 3339, ficando só com o dia
pub fn parse_calendar_day(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}
