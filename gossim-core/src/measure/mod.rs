mod credit;
mod delay;
mod rate;

pub use self::{credit::NsCredit, delay::LinkDelay, rate::BitRate};
