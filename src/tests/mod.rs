mod postgres;
mod shorten;
