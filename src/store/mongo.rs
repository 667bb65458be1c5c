use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database, IndexModel};

use crate::errors::Result;
use crate::models::ride::{PaymentStatus, Ride, TripStatus};
use crate::store::{DriverDirectory, RideStore};

/// Ride persistence on the `rides` collection. All transitions go through
/// `find_one_and_update` with a compare-and-swap filter and a narrow `$set`,
/// so writers on unrelated fields never clobber each other.
#[derive(Clone)]
pub struct MongoRideStore {
    collection: Collection<Ride>,
}

impl MongoRideStore {
    pub fn new(db: &Database) -> Self {
        MongoRideStore {
            collection: db.collection("rides"),
        }
    }

    /// Callbacks arrive keyed by correlation token, so that lookup must not
    /// scan the collection.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "payment_correlation_id": 1 })
                    .build(),
            )
            .await?;
        self.collection
            .create_index(IndexModel::builder().keys(doc! { "status": 1 }).build())
            .await?;
        Ok(())
    }

    fn oid(ride_id: &str) -> Result<ObjectId> {
        Ok(ObjectId::parse_str(ride_id)?)
    }
}

#[async_trait]
impl RideStore for MongoRideStore {
    async fn insert(&self, ride: Ride) -> Result<Ride> {
        self.collection.insert_one(&ride).await?;
        Ok(ride)
    }

    async fn find(&self, ride_id: &str) -> Result<Option<Ride>> {
        let filter = doc! { "_id": Self::oid(ride_id)? };
        Ok(self.collection.find_one(filter).await?)
    }

    async fn find_by_correlation(&self, correlation_id: &str) -> Result<Option<Ride>> {
        let filter = doc! { "payment_correlation_id": correlation_id };
        Ok(self.collection.find_one(filter).await?)
    }

    async fn list_for_passenger(&self, passenger_id: &str) -> Result<Vec<Ride>> {
        let cursor = self
            .collection
            .find(doc! { "passenger_id": passenger_id })
            .await?;
        let mut rides: Vec<Ride> = cursor.try_collect().await?;
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rides)
    }

    async fn list_open(&self) -> Result<Vec<Ride>> {
        let cursor = self
            .collection
            .find(doc! { "status": TripStatus::Requested.as_str() })
            .await?;
        let mut rides: Vec<Ride> = cursor.try_collect().await?;
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rides)
    }

    async fn try_accept(&self, ride_id: &str, driver_id: &str) -> Result<Option<Ride>> {
        let filter = doc! {
            "_id": Self::oid(ride_id)?,
            "status": TripStatus::Requested.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": TripStatus::Accepted.as_str(),
                "driver_id": driver_id,
                "updated_at": BsonDateTime::now(),
            }
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn set_arrived(&self, ride_id: &str) -> Result<Option<Ride>> {
        let filter = doc! { "_id": Self::oid(ride_id)? };
        let update = doc! {
            "$set": {
                "driver_arrived": true,
                "updated_at": BsonDateTime::now(),
            }
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn try_complete(&self, ride_id: &str) -> Result<Option<Ride>> {
        let filter = doc! {
            "_id": Self::oid(ride_id)?,
            "status": TripStatus::Accepted.as_str(),
        };
        let update = doc! {
            "$set": {
                "status": TripStatus::Completed.as_str(),
                "updated_at": BsonDateTime::now(),
            }
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn set_rating(
        &self,
        ride_id: &str,
        rating: i32,
        review: Option<&str>,
    ) -> Result<Option<Ride>> {
        let filter = doc! { "_id": Self::oid(ride_id)? };
        let mut set = doc! {
            "rating": rating,
            "updated_at": BsonDateTime::now(),
        };
        if let Some(review) = review {
            set.insert("review", review);
        }
        Ok(self
            .collection
            .find_one_and_update(filter, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn begin_payment(&self, ride_id: &str, correlation_id: &str) -> Result<Option<Ride>> {
        let filter = doc! {
            "_id": Self::oid(ride_id)?,
            "payment_status": { "$ne": PaymentStatus::Paid.as_str() },
        };
        let update = doc! {
            "$set": {
                "payment_status": PaymentStatus::Pending.as_str(),
                "payment_correlation_id": correlation_id,
                "updated_at": BsonDateTime::now(),
            }
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn settle_success(&self, correlation_id: &str, receipt: &str) -> Result<Option<Ride>> {
        let filter = doc! {
            "payment_correlation_id": correlation_id,
            "payment_status": { "$ne": PaymentStatus::Paid.as_str() },
        };
        let update = doc! {
            "$set": {
                "payment_status": PaymentStatus::Paid.as_str(),
                "mpesa_receipt": receipt,
                "updated_at": BsonDateTime::now(),
            }
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn settle_failure(&self, correlation_id: &str) -> Result<Option<Ride>> {
        let filter = doc! {
            "payment_correlation_id": correlation_id,
            "payment_status": { "$ne": PaymentStatus::Paid.as_str() },
        };
        let update = doc! {
            "$set": {
                "payment_status": PaymentStatus::Failed.as_str(),
                "updated_at": BsonDateTime::now(),
            }
        };
        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?)
    }
}

/// Availability flag on the external `users` collection.
#[derive(Clone)]
pub struct MongoDriverDirectory {
    users: Collection<Document>,
}

impl MongoDriverDirectory {
    pub fn new(db: &Database) -> Self {
        MongoDriverDirectory {
            users: db.collection("users"),
        }
    }
}

#[async_trait]
impl DriverDirectory for MongoDriverDirectory {
    async fn set_available(&self, driver_id: &str, available: bool) -> Result<()> {
        let filter = doc! { "_id": ObjectId::parse_str(driver_id)? };
        let update = doc! {
            "$set": {
                "is_available": available,
                "updated_at": BsonDateTime::now(),
            }
        };
        self.users.update_one(filter, update).await?;
        Ok(())
    }
}
