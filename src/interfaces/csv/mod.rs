pub mod payout_writer;
