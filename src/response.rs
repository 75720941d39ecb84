use crate::serde::Serialize;
use crate::uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct List<T> {
    list: Vec<T>,
    total: i64,
}

impl<T> List<T> {
    pub fn new(list: Vec<T>, total: i64) -> Self {
        List { list, total }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

impl DeleteResponse {
    pub fn new(deleted: u64) -> Self {
        DeleteResponse { deleted }
    }
}
