use crate::runtime::contract::LicenseRecord;

pub trait LicenseStore {
    fn put_license(&self, record: &LicenseRecord) -> Result<(), String>;
}
