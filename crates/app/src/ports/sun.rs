//! Solar time source port.
//!
//! Computing sunrise and sunset is out of scope; the engine only asks for
//! the result for a premises on a given day.

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;

use homerule_domain::automation::SunTimes;
use homerule_domain::error::HomeRuleError;
use homerule_domain::id::PremisesId;

pub trait SunTimesSource: Send + Sync {
    fn sun_times(
        &self,
        premises_id: PremisesId,
        date: NaiveDate,
    ) -> impl Future<Output = Result<SunTimes, HomeRuleError>> + Send;
}

/// The same sunrise and sunset for every premises and every day.
#[derive(Debug, Clone, Copy)]
pub struct FixedSunTimes(pub SunTimes);

impl SunTimesSource for FixedSunTimes {
    async fn sun_times(
        &self,
        _premises_id: PremisesId,
        _date: NaiveDate,
    ) -> Result<SunTimes, HomeRuleError> {
        Ok(self.0)
    }
}

impl<T: SunTimesSource> SunTimesSource for Arc<T> {
    fn sun_times(
        &self,
        premises_id: PremisesId,
        date: NaiveDate,
    ) -> impl Future<Output = Result<SunTimes, HomeRuleError>> + Send {
        (**self).sun_times(premises_id, date)
    }
}
