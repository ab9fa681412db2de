use crate::runtime::events::DataEventRecord;

pub trait EventStore {
    fn put_event(&self, record: &DataEventRecord) -> Result<(), String>;
}
